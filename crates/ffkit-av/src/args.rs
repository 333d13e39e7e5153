//! Ordered argument token container.

use std::fmt;

/// An ordered, appendable list of command-line tokens.
///
/// Every part of a [`Session`](crate::Session) (input options, audio and video
/// options, global options, complex filters) is kept in one of these and
/// concatenated during argument assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgList {
    tokens: Vec<String>,
}

impl ArgList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single token.
    pub fn push(&mut self, token: impl ToString) -> &mut Self {
        self.tokens.push(token.to_string());
        self
    }

    /// Append several tokens in order.
    pub fn extend<I, T>(&mut self, tokens: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.tokens.extend(tokens.into_iter().map(|t| t.to_string()));
        self
    }

    /// Remove all tokens.
    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    /// Find the first occurrence of `key` and return the `count` tokens that
    /// follow it.
    ///
    /// Returns `None` if the key is absent or fewer than `count` tokens follow.
    pub fn find(&self, key: &str, count: usize) -> Option<&[String]> {
        let pos = self.tokens.iter().position(|t| t == key)?;
        let start = pos + 1;
        let end = start + count;
        if end > self.tokens.len() {
            return None;
        }
        Some(&self.tokens[start..end])
    }

    /// Remove the first occurrence of `key` and up to `count` following
    /// tokens. Returns whether the key was found.
    pub fn remove(&mut self, key: &str, count: usize) -> bool {
        match self.tokens.iter().position(|t| t == key) {
            Some(pos) => {
                let end = (pos + 1 + count).min(self.tokens.len());
                self.tokens.drain(pos..end);
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tokens
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.tokens.iter()
    }
}

impl<T: ToString> FromIterator<T> for ArgList {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut list = ArgList::new();
        list.extend(iter);
        list
    }
}

impl<'a> IntoIterator for &'a ArgList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

impl fmt::Display for ArgList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_extend_keep_order() {
        let mut args = ArgList::new();
        args.push("-f").push("mp4");
        args.extend(["-ss", "10"]);
        args.push(25);
        assert_eq!(args.as_slice(), ["-f", "mp4", "-ss", "10", "25"]);
    }

    #[test]
    fn find_returns_following_tokens() {
        let args: ArgList = ["-acodec", "aac", "-b:a", "128k"].into_iter().collect();
        assert_eq!(args.find("-acodec", 1), Some(&["aac".to_string()][..]));
        assert_eq!(args.find("-acodec", 3).map(|s| s.len()), Some(3));
        assert_eq!(args.find("-b:a", 2), None);
        assert_eq!(args.find("-vcodec", 1), None);
        assert_eq!(args.find("-b:a", 0), Some(&[] as &[String]));
    }

    #[test]
    fn remove_key_and_values() {
        let mut args: ArgList = ["-an", "-acodec", "aac", "-ac", "2"].into_iter().collect();
        assert!(args.remove("-acodec", 1));
        assert_eq!(args.as_slice(), ["-an", "-ac", "2"]);
        assert!(!args.remove("-vcodec", 1));
        // Count past the end only removes what exists.
        assert!(args.remove("-ac", 5));
        assert_eq!(args.as_slice(), ["-an"]);
    }

    #[test]
    fn clone_is_independent() {
        let mut original: ArgList = ["-r", "25"].into_iter().collect();
        let mut copy = original.clone();
        copy.push("-re");
        original.clear();
        assert!(original.is_empty());
        assert_eq!(copy.len(), 3);
    }
}

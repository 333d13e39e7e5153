//! Filter graph string synthesis.
//!
//! Turns declarative [`FilterSpec`]s into the engine's filter syntax:
//! `[in1][in2]name=opt1:opt2[out1][out2]`.

use std::fmt;

/// A single option value inside a filter specification.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl FilterValue {
    /// Render the value, single-quoting strings that contain a comma.
    fn render(&self) -> String {
        match self {
            FilterValue::Str(s) if s.contains(',') => format!("'{s}'"),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Str(s) => f.write_str(s),
            FilterValue::Int(i) => write!(f, "{i}"),
            FilterValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Str(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Str(s)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Int(v.into())
    }
}

impl From<u32> for FilterValue {
    fn from(v: u32) -> Self {
        FilterValue::Int(v.into())
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

/// Options attached to a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOptions {
    /// `name=value`
    Scalar(FilterValue),
    /// `name=v1:v2:v3`
    List(Vec<FilterValue>),
    /// `name=k1=v1:k2=v2`, in insertion order.
    Named(Vec<(String, FilterValue)>),
}

/// A structured filter: name, stream labels and options.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub filter: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub options: Option<FilterOptions>,
}

impl Filter {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            options: None,
        }
    }

    /// Add an input stream label. Surrounding brackets are optional.
    pub fn input(mut self, label: impl Into<String>) -> Self {
        self.inputs.push(label.into());
        self
    }

    /// Add an output stream label. Surrounding brackets are optional.
    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }

    /// Add a named option, converting any previous scalar/list options.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        let entry = (key.into(), value.into());
        match &mut self.options {
            Some(FilterOptions::Named(named)) => named.push(entry),
            _ => self.options = Some(FilterOptions::Named(vec![entry])),
        }
        self
    }

    /// Set positional options.
    pub fn args<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FilterValue>,
    {
        self.options = Some(FilterOptions::List(
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Set a single scalar option.
    pub fn value(mut self, value: impl Into<FilterValue>) -> Self {
        self.options = Some(FilterOptions::Scalar(value.into()));
        self
    }
}

/// A filter specification: either a pre-formatted string or a structured
/// [`Filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSpec {
    Raw(String),
    Graph(Filter),
}

impl From<&str> for FilterSpec {
    fn from(s: &str) -> Self {
        FilterSpec::Raw(s.to_string())
    }
}

impl From<String> for FilterSpec {
    fn from(s: String) -> Self {
        FilterSpec::Raw(s)
    }
}

impl From<Filter> for FilterSpec {
    fn from(f: Filter) -> Self {
        FilterSpec::Graph(f)
    }
}

/// Wrap a stream specifier in brackets, dropping brackets it already has.
pub(crate) fn bracket_stream(spec: &str) -> String {
    let inner = spec.strip_prefix('[').unwrap_or(spec);
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    format!("[{inner}]")
}

impl FilterSpec {
    /// Render this spec in filter-graph syntax.
    pub fn to_filter_string(&self) -> String {
        match self {
            FilterSpec::Raw(s) => s.clone(),
            FilterSpec::Graph(f) => {
                let mut out: String = f.inputs.iter().map(|s| bracket_stream(s)).collect();
                out.push_str(&f.filter);

                match &f.options {
                    Some(FilterOptions::Scalar(v)) => {
                        out.push('=');
                        out.push_str(&v.to_string());
                    }
                    Some(FilterOptions::List(values)) if !values.is_empty() => {
                        let joined: Vec<String> = values.iter().map(FilterValue::render).collect();
                        out.push('=');
                        out.push_str(&joined.join(":"));
                    }
                    Some(FilterOptions::Named(named)) if !named.is_empty() => {
                        let joined: Vec<String> = named
                            .iter()
                            .map(|(k, v)| format!("{k}={}", v.render()))
                            .collect();
                        out.push('=');
                        out.push_str(&joined.join(":"));
                    }
                    _ => {}
                }

                out.extend(f.outputs.iter().map(|s| bracket_stream(s)));
                out
            }
        }
    }
}

/// Render a list of filter specs, preserving order.
pub fn make_filter_strings(specs: &[FilterSpec]) -> Vec<String> {
    specs.iter().map(FilterSpec::to_filter_string).collect()
}

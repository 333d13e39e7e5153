//! Engine capability probing and validation.
//!
//! Listings are queried from the engine once and cached on the [`Engine`]
//! until it is reset.

mod parse;

pub use parse::{
    parse_codecs, parse_encoders, parse_filters, parse_formats, CodecInfo, Codecs, EncoderInfo,
    Encoders, FilterInfo, Filters, FormatInfo, Formats, MediaKind, PadKind,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::engine::Engine;
use crate::error::{Category, Error, Result};
use crate::process::Invocation;
use crate::session::Session;
use crate::tools::Tool;

/// Cached capability listings.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    formats: Mutex<Option<Arc<Formats>>>,
    codecs: Mutex<Option<Arc<Codecs>>>,
    encoders: Mutex<Option<Arc<Encoders>>>,
    filters: Mutex<Option<Arc<Filters>>>,
}

impl CapabilityCache {
    pub fn reset(&self) {
        self.formats.lock().take();
        self.codecs.lock().take();
        self.encoders.lock().take();
        self.filters.lock().take();
    }
}

impl Engine {
    /// Query, parse and cache one listing. An empty listing means the
    /// output was not in a layout the parser knows.
    async fn cached<V>(
        &self,
        slot: &Mutex<Option<Arc<BTreeMap<String, V>>>>,
        flag: &str,
        parse: fn(&str) -> BTreeMap<String, V>,
    ) -> Result<Arc<BTreeMap<String, V>>> {
        let cached = slot.lock().clone();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let ffmpeg = self.tools().require(Tool::Ffmpeg)?;
        debug!("querying engine capabilities with {flag}");
        let captured = Invocation::new(Tool::Ffmpeg.name(), ffmpeg)
            .arg(flag)
            .capture_stdout(true)
            .stdout_lines(0)
            .execute()
            .await?;

        let parsed = parse(&captured.stdout);
        if parsed.is_empty() {
            return Err(Error::parse_error(
                Tool::Ffmpeg.name(),
                format!("no entries found in {flag} listing"),
            ));
        }
        let parsed = Arc::new(parsed);
        *slot.lock() = Some(parsed.clone());
        Ok(parsed)
    }

    /// Container formats known to the engine.
    pub async fn formats(&self) -> Result<Arc<Formats>> {
        self.cached(&self.capabilities().formats, "-formats", parse_formats)
            .await
    }

    /// Codecs known to the engine, including per-implementation entries.
    pub async fn codecs(&self) -> Result<Arc<Codecs>> {
        self.cached(&self.capabilities().codecs, "-codecs", parse_codecs)
            .await
    }

    pub async fn encoders(&self) -> Result<Arc<Encoders>> {
        self.cached(&self.capabilities().encoders, "-encoders", parse_encoders)
            .await
    }

    pub async fn filters(&self) -> Result<Arc<Filters>> {
        self.cached(&self.capabilities().filters, "-filters", parse_filters)
            .await
    }

    /// Check that every format and codec the session requests is available.
    pub async fn validate(&self, session: &Session) -> Result<()> {
        let formats = self.formats().await?;
        check_formats(session, &formats)?;
        let encoders = self.encoders().await?;
        check_codecs(session, &encoders)
    }
}

fn unavailable(category: Category, names: Vec<String>) -> Result<()> {
    if names.is_empty() {
        Ok(())
    } else {
        Err(Error::Unavailable { category, names })
    }
}

/// Check requested output then input formats.
pub fn check_formats(session: &Session, formats: &Formats) -> Result<()> {
    let missing_outputs: Vec<String> = session
        .outputs()
        .iter()
        .filter_map(|o| o.options().find("-f", 1))
        .map(|v| v[0].clone())
        .filter(|name| !formats.get(name).is_some_and(|f| f.can_mux))
        .collect();
    unavailable(Category::OutputFormat, missing_outputs)?;

    let missing_inputs: Vec<String> = session
        .inputs()
        .iter()
        .filter_map(|i| i.options().find("-f", 1))
        .map(|v| v[0].clone())
        .filter(|name| !formats.get(name).is_some_and(|f| f.can_demux))
        .collect();
    unavailable(Category::InputFormat, missing_inputs)
}

/// Check requested audio then video encoders. `copy` always passes.
pub fn check_codecs(session: &Session, encoders: &Encoders) -> Result<()> {
    let missing = |flag: &str, kind: MediaKind| -> Vec<String> {
        session
            .outputs()
            .iter()
            .filter_map(|o| {
                let list = if kind == MediaKind::Audio {
                    o.audio()
                } else {
                    o.video()
                };
                list.find(flag, 1).map(|v| v[0].clone())
            })
            .filter(|name| name != "copy")
            .filter(|name| !encoders.get(name).is_some_and(|e| e.kind == kind))
            .collect()
    };

    unavailable(Category::AudioCodec, missing("-acodec", MediaKind::Audio))?;
    unavailable(Category::VideoCodec, missing("-vcodec", MediaKind::Video))
}

/// Insert `-strict experimental` after every experimental encoder.
///
/// Codec selections must appear as adjacent `-acodec <name>` or
/// `-vcodec <name>` pairs, which is how the session's codec mutators emit
/// them.
pub fn patch_experimental(args: &mut Vec<String>, encoders: &Encoders) {
    let mut i = 0;
    while i + 1 < args.len() {
        let is_codec_flag = args[i] == "-acodec" || args[i] == "-vcodec";
        if is_codec_flag && encoders.get(&args[i + 1]).is_some_and(|e| e.experimental) {
            debug!("enabling experimental encoder {}", args[i + 1]);
            args.insert(i + 2, "-strict".to_string());
            args.insert(i + 3, "experimental".to_string());
            i += 4;
        } else {
            i += 1;
        }
    }
}

use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use log::{debug, info, warn};
use moka::sync::Cache;
use serde::Deserialize;

use crate::config::ThumbnailConfig;

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("Failed to run {tool}: {reason}")]
    Spawn { tool: String, reason: String },

    #[error("{tool} exited with {status}")]
    Failed { tool: String, status: String },

    #[error("Unreadable ffprobe output: {0}")]
    Probe(String),

    #[error("Temporary file error: {0}")]
    TempFile(String),
}

/// Stream list as printed by `ffprobe -show_streams -print_format json`
#[derive(Debug, Default, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
pub struct ProbeStream {
    pub index: usize,
    #[serde(default)]
    pub codec_type: String,
    #[serde(default)]
    pub disposition: Option<ProbeDisposition>,
    #[serde(default)]
    pub tags: Option<ProbeTags>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeDisposition {
    #[serde(default)]
    pub attached_pic: u8,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProbeTags {
    pub mimetype: Option<String>,
}

impl ProbeStream {
    fn is_attached_pic(&self) -> bool {
        self.disposition.as_ref().map_or(false, |d| d.attached_pic == 1)
    }

    fn is_image_attachment(&self) -> bool {
        self.codec_type == "attachment"
            && self
                .tags
                .as_ref()
                .and_then(|t| t.mimetype.as_deref())
                .map_or(false, |m| m.starts_with("image"))
    }
}

impl ProbeOutput {
    /// Indices of attachment streams carrying an image
    pub fn image_attachments(&self) -> Vec<usize> {
        self.streams
            .iter()
            .filter(|s| s.is_image_attachment())
            .map(|s| s.index)
            .collect()
    }

    /// Indices of video streams, embedded cover pictures first
    pub fn video_streams(&self) -> Vec<usize> {
        let (pictures, plain): (Vec<&ProbeStream>, Vec<&ProbeStream>) = self
            .streams
            .iter()
            .filter(|s| s.codec_type == "video")
            .partition(|s| s.is_attached_pic());

        pictures.into_iter().chain(plain).map(|s| s.index).collect()
    }
}

/// Local path for a media URL as reported by the player
pub fn media_path(url: &str) -> String {
    match url.strip_prefix("file://") {
        Some(path) => urlencoding::decode(path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| path.to_string()),
        None => url.to_string(),
    }
}

/// ffmpeg arguments encoding a single scaled webp frame to stdout
pub fn output_options(size: u32) -> Vec<String> {
    vec![
        "-vf".to_string(),
        format!(
            "trim=0:180,thumbnail,format=rgb24,scale={s}*min(1\\,dar):{s}/max(1\\,dar):flags=lanczos,setsar=1",
            s = size
        ),
        "-f".to_string(),
        "image2pipe".to_string(),
        "-c:v".to_string(),
        "libwebp".to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-".to_string(),
    ]
}

/// Extracts cover art or a representative video frame as webp
pub struct ThumbnailGenerator {
    config: ThumbnailConfig,
    cache: Cache<String, Arc<Vec<u8>>>,
    lock: Mutex<()>,
}

impl ThumbnailGenerator {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            config: config.clone(),
            cache: Cache::builder()
                .max_capacity(config.cache_size.max(1))
                .time_to_live(Duration::from_secs(config.cache_ttl_secs))
                .build(),
            lock: Mutex::new(()),
        }
    }

    /// Thumbnail for a media URL, None if nothing could be extracted
    ///
    /// Only one extraction runs at a time. Successful results are cached;
    /// failures are retried on the next call.
    pub fn generate(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        if url.is_empty() {
            return None;
        }

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = self.cache.get(url) {
            debug!("Thumbnail cache hit for {}", url);
            return Some(cached);
        }

        match self.extract(&media_path(url)) {
            Ok(Some(image)) => {
                info!("Generated thumbnail for {} ({} bytes)", url, image.len());
                let image = Arc::new(image);
                self.cache.insert(url.to_string(), image.clone());
                Some(image)
            }
            Ok(None) => {
                debug!("No usable stream for a thumbnail in {}", url);
                None
            }
            Err(e) => {
                warn!("Thumbnail extraction for {} failed: {}", url, e);
                None
            }
        }
    }

    fn extract(&self, path: &str) -> Result<Option<Vec<u8>>, ThumbnailError> {
        let probe = self.probe(path)?;

        for index in probe.image_attachments() {
            match self.from_attachment(path, index) {
                Ok(image) if !image.is_empty() => return Ok(Some(image)),
                Ok(_) => {}
                Err(e) => debug!("Attachment {} unusable: {}", index, e),
            }
        }

        for index in probe.video_streams() {
            match self.from_video_stream(path, index) {
                Ok(image) if !image.is_empty() => return Ok(Some(image)),
                Ok(_) => {}
                Err(e) => debug!("Video stream {} unusable: {}", index, e),
            }
        }

        Ok(None)
    }

    fn probe(&self, path: &str) -> Result<ProbeOutput, ThumbnailError> {
        let output = run_tool(
            &self.config.ffprobe,
            &["-v", "quiet", "-show_streams", "-print_format", "json", path],
        )?;
        serde_json::from_slice(&output).map_err(|e| ThumbnailError::Probe(e.to_string()))
    }

    fn from_video_stream(&self, path: &str, index: usize) -> Result<Vec<u8>, ThumbnailError> {
        let map = format!("0:{}", index);
        let mut args = vec!["-hide_banner", "-skip_frame", "nokey", "-i", path, "-map", &map];
        let options = output_options(self.config.size);
        args.extend(options.iter().map(String::as_str));
        run_tool(&self.config.ffmpeg, &args)
    }

    fn from_attachment(&self, path: &str, index: usize) -> Result<Vec<u8>, ThumbnailError> {
        let dir = tempfile::tempdir().map_err(|e| ThumbnailError::TempFile(e.to_string()))?;
        let dumped = dir.path().join("attachment");
        let dumped = dumped.to_string_lossy();

        let dump = format!("-dump_attachment:{}", index);
        run_tool(
            &self.config.ffmpeg,
            &["-hide_banner", &dump, &dumped, "-i", path, "-f", "ffmetadata", "-"],
        )?;

        let mut args = vec!["-hide_banner", "-i", &dumped];
        let options = output_options(self.config.size);
        args.extend(options.iter().map(String::as_str));
        run_tool(&self.config.ffmpeg, &args)
    }
}

fn run_tool(tool: &str, args: &[&str]) -> Result<Vec<u8>, ThumbnailError> {
    debug!("Running {} {}", tool, args.join(" "));
    let output = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| ThumbnailError::Spawn {
            tool: tool.to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ThumbnailError::Failed {
            tool: tool.to_string(),
            status: output.status.to_string(),
        });
    }
    Ok(output.stdout)
}

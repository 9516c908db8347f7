use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

use crate::config::{NamingPolicy, STATIC_MOUNT, UploadConfig};

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("No file uploaded")]
    MissingFile,
    #[error("No file selected")]
    EmptyFilename,
    #[error("Invalid file type")]
    InvalidType,
    #[error("File too large (limit is {limit} bytes)")]
    FileTooLarge { limit: usize },
    #[error("Malformed upload: {0}")]
    Multipart(String),
    #[error("Upload failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The `file` part of an upload request, before it touches the disk.
#[derive(Debug)]
pub struct FileUpload {
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub original_name: String,
    pub sanitized_name: String,
    pub stored_name: String,
    pub path: PathBuf,
    /// Relative URL path the browser loads the image from.
    pub image_path: String,
    pub size: usize,
}

#[derive(Clone)]
pub struct UploadService {
    upload_dir: PathBuf,
    public_prefix: String,
    max_bytes: usize,
    naming: NamingPolicy,
}

impl UploadService {
    pub fn new(config: &UploadConfig, static_dir: &Path) -> Self {
        let public_prefix = Self::public_prefix(&config.dir, static_dir).unwrap_or_else(|| {
            log::warn!(
                "Upload dir {} is outside {}; images will not be served",
                config.dir.display(),
                static_dir.display()
            );
            STATIC_MOUNT.to_string()
        });

        Self {
            upload_dir: config.dir.clone(),
            public_prefix,
            max_bytes: config.max_bytes,
            naming: config.naming,
        }
    }

    /// `static/<upload_dir relative to static_dir>` with `/` separators, or
    /// `None` when `upload_dir` does not sit inside `static_dir`.
    pub fn public_prefix(upload_dir: &Path, static_dir: &Path) -> Option<String> {
        let normalize = |path: &Path| -> PathBuf {
            path.components()
                .filter(|c| !matches!(c, Component::CurDir))
                .collect()
        };
        let upload_dir = normalize(upload_dir);
        let relative = upload_dir.strip_prefix(normalize(static_dir)).ok()?;

        let mut segments = vec![STATIC_MOUNT.to_string()];
        for component in relative.components() {
            match component {
                Component::Normal(segment) => segments.push(segment.to_str()?.to_string()),
                _ => return None,
            }
        }
        Some(segments.join("/"))
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn calculate_image_hash(image_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image_data);
        hex::encode(hasher.finalize())
    }

    /// Lower-cased text after the final dot, if it is an allowed image type.
    pub fn extract_file_extension(filename: &str) -> Result<String, IntakeError> {
        let (_, extension) = filename.rsplit_once('.').ok_or(IntakeError::InvalidType)?;
        let extension = extension.to_ascii_lowercase();
        if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            Ok(extension)
        } else {
            Err(IntakeError::InvalidType)
        }
    }

    /// Reduces a client filename (NFKD-folded first, so accents survive as
    /// their base letters) to `[A-Za-z0-9._-]` with no path components.
    /// May return an empty string.
    pub fn sanitize_filename(filename: &str) -> String {
        let ascii: String = filename.nfkd().filter(char::is_ascii).collect();
        let spaced = ascii.replace(['/', '\\'], " ");
        let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
        let safe: String = joined
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            .collect();
        safe.trim_matches(|c| c == '.' || c == '_').to_string()
    }

    pub fn validate_image_size(&self, size: usize) -> Result<(), IntakeError> {
        if size > self.max_bytes {
            return Err(IntakeError::FileTooLarge {
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    pub fn generate_stored_name(
        &self,
        sanitized_name: &str,
        extension: &str,
        image_data: &[u8],
    ) -> String {
        match self.naming {
            NamingPolicy::Original if Self::extract_file_extension(sanitized_name).is_ok() => {
                sanitized_name.to_string()
            }
            _ => format!("{}.{}", Self::calculate_image_hash(image_data), extension),
        }
    }

    pub async fn store(&self, upload: FileUpload) -> Result<UploadedImage, IntakeError> {
        if upload.filename.is_empty() {
            return Err(IntakeError::EmptyFilename);
        }
        let extension = Self::extract_file_extension(&upload.filename)?;
        self.validate_image_size(upload.data.len())?;

        let sanitized_name = Self::sanitize_filename(&upload.filename);
        let stored_name = self.generate_stored_name(&sanitized_name, &extension, &upload.data);

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let path = self.upload_dir.join(&stored_name);
        tokio::fs::write(&path, &upload.data).await?;

        Ok(UploadedImage {
            image_path: format!("{}/{}", self.public_prefix, stored_name),
            original_name: upload.filename,
            sanitized_name,
            stored_name,
            path,
            size: upload.data.len(),
        })
    }
}

use std::path::Path;

use url::Url;

use crate::common::error::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    S3,
    Http,
    Https,
}

/// A parsed, scheme-checked source reference.
#[derive(Debug, Clone)]
pub struct SourceRef {
    raw: String,
    url: Url,
    scheme: Scheme,
}

impl SourceRef {
    pub fn parse(raw: &str) -> Result<Self, JobError> {
        let raw = raw.trim();

        let url = Url::parse(raw).map_err(|e| JobError::InvalidSource {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        let scheme = match url.scheme() {
            "s3" => Scheme::S3,
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(JobError::UnsupportedScheme(other.to_string())),
        };

        Ok(Self {
            raw: raw.to_string(),
            url,
            scheme,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The reference as received (trimmed), suitable for remote reads.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Filename used for the local working copy.
    pub fn filename(&self) -> Result<String, JobError> {
        Path::new(self.url.path())
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.to_string())
            .ok_or_else(|| JobError::InvalidSource {
                url: self.raw.clone(),
                reason: "no filename in path".to_string(),
            })
    }

    /// Bucket and key of an `s3://` reference.
    pub fn s3_parts(&self) -> Result<(String, String), JobError> {
        let bucket = self
            .url
            .host_str()
            .ok_or_else(|| JobError::InvalidSource {
                url: self.raw.clone(),
                reason: "missing bucket".to_string(),
            })?
            .to_string();

        let key = self.url.path().trim_start_matches('/').to_string();
        if key.is_empty() {
            return Err(JobError::InvalidSource {
                url: self.raw.clone(),
                reason: "missing object key".to_string(),
            });
        }

        Ok((bucket, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_allowed_schemes() {
        assert_eq!(
            SourceRef::parse("s3://bucket/key.tif").unwrap().scheme(),
            Scheme::S3
        );
        assert_eq!(
            SourceRef::parse("http://host/a.tif").unwrap().scheme(),
            Scheme::Http
        );
        assert_eq!(
            SourceRef::parse("https://host/a.tif").unwrap().scheme(),
            Scheme::Https
        );
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(matches!(
            SourceRef::parse("ftp://host/a.tif"),
            Err(JobError::UnsupportedScheme(scheme)) if scheme == "ftp"
        ));
        assert!(matches!(
            SourceRef::parse("file:///a.tif"),
            Err(JobError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            SourceRef::parse("not a url"),
            Err(JobError::InvalidSource { .. })
        ));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let source = SourceRef::parse("  s3://bucket/key.tif\n").unwrap();
        assert_eq!(source.as_str(), "s3://bucket/key.tif");
    }

    #[test]
    fn derives_filename_from_path() {
        let source = SourceRef::parse("https://host/data/AOI_7/scene.tif?x=1").unwrap();
        assert_eq!(source.filename().unwrap(), "scene.tif");
    }

    #[test]
    fn missing_filename_is_an_error() {
        let source = SourceRef::parse("https://host/").unwrap();
        assert!(source.filename().is_err());
    }

    #[test]
    fn splits_s3_bucket_and_key() {
        let source = SourceRef::parse("s3://my-bucket/deep/path/scene.tif").unwrap();
        let (bucket, key) = source.s3_parts().unwrap();
        assert_eq!(bucket, "my-bucket");
        assert_eq!(key, "deep/path/scene.tif");
    }

    #[test]
    fn s3_reference_without_key_is_an_error() {
        let source = SourceRef::parse("s3://my-bucket/").unwrap();
        assert!(source.s3_parts().is_err());
    }
}

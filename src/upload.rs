//! Purpose: Post a multipart form (text fields plus file attachments) to an echo endpoint.
//! Exports: `UploadConfig`, `Form`, `FormFile`, `UploadReport`, `UploadEcho`, `build_form`, `upload`.
//! Role: Builds the form from local files, sends it under one fixed deadline, requires 200.
//! Invariants: Fields are `date` (RFC 3339) and `description`; files are `file1`, `file2`, ...
//! Invariants: File parts carry the base name of the source path, never the full path.
#![allow(clippy::result_large_err)]

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::client::{HttpClient, parse_http_url};
use crate::core::error::{Error, ErrorKind};
use crate::multipart::MultipartWriter;

pub const DEFAULT_UPLOAD_URL: &str = "https://httpbin.org/post";
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_DESCRIPTION: &str = "Form values with attached files";
pub const DEFAULT_FILES: [&str; 2] = ["./files/hello.txt", "./files/goodbye.txt"];

#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub url: String,
    pub timeout: Duration,
    pub description: String,
    pub files: Vec<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPLOAD_URL.to_string(),
            timeout: DEFAULT_UPLOAD_TIMEOUT,
            description: DEFAULT_DESCRIPTION.to_string(),
            files: DEFAULT_FILES.iter().map(PathBuf::from).collect(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FormFile {
    pub field: String,
    pub file_name: String,
    pub contents: Vec<u8>,
}

/// An encoded form plus what went into it.
#[derive(Clone, Debug)]
pub struct Form {
    pub content_type: String,
    pub body: Vec<u8>,
    pub fields: Vec<(String, String)>,
    pub files: Vec<FormFile>,
}

#[derive(Clone, Debug)]
pub struct UploadReport {
    pub status: u16,
    pub body: String,
    pub echo: Option<UploadEcho>,
}

/// The subset of an httpbin-style echo that reflects a multipart post.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UploadEcho {
    #[serde(default)]
    pub form: BTreeMap<String, Value>,
    #[serde(default)]
    pub files: BTreeMap<String, Value>,
}

impl UploadEcho {
    /// True when every posted field value and every file part shows up in the echo.
    pub fn contains_form(&self, form: &Form) -> bool {
        let fields_ok = form
            .fields
            .iter()
            .all(|(name, value)| echo_has_value(self.form.get(name), value));
        let files_ok = form.files.iter().all(|file| {
            let contents = String::from_utf8_lossy(&file.contents);
            echo_has_value(self.files.get(&file.field), &contents)
        });
        fields_ok && files_ok
    }
}

fn echo_has_value(echoed: Option<&Value>, expected: &str) -> bool {
    match echoed {
        Some(Value::String(value)) => value == expected,
        Some(Value::Array(values)) => values.iter().any(|value| value.as_str() == Some(expected)),
        _ => false,
    }
}

pub fn build_form(config: &UploadConfig, now: OffsetDateTime) -> Result<Form, Error> {
    let date = now.format(&Rfc3339).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to format date field")
            .with_source(err)
    })?;
    let fields = vec![
        ("date".to_string(), date),
        ("description".to_string(), config.description.clone()),
    ];

    let mut writer = MultipartWriter::new()?;
    for (name, value) in &fields {
        writer.write_field(name, value);
    }

    let mut files = Vec::with_capacity(config.files.len());
    for (index, path) in config.files.iter().enumerate() {
        let field = format!("file{}", index + 1);
        let file_name = base_name(path)?;
        let contents = std::fs::read(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to read {}", path.display()))
                .with_source(err)
        })?;
        writer.write_file(&field, &file_name, contents.as_slice())?;
        files.push(FormFile {
            field,
            file_name,
            contents,
        });
    }

    let content_type = writer.content_type();
    Ok(Form {
        content_type,
        body: writer.finish(),
        fields,
        files,
    })
}

pub fn upload(config: &UploadConfig) -> Result<(Form, UploadReport), Error> {
    parse_http_url(&config.url)?;
    if config.timeout.is_zero() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("upload timeout must be greater than zero"));
    }
    for path in &config.files {
        ensure_readable(path)?;
    }

    let form = build_form(config, OffsetDateTime::now_utc())?;
    tracing::debug!(
        url = %config.url,
        bytes = form.body.len(),
        files = form.files.len(),
        "posting multipart form"
    );

    let response = HttpClient::with_timeout(config.timeout)
        .post(&config.url, &form.content_type, &form.body)?
        .expect_status(200)
        .map_err(|err| err.with_url(config.url.clone()))?;

    let status = response.status();
    let body = response.body_text();
    let echo = serde_json::from_str::<UploadEcho>(&body).ok();
    tracing::info!("\n{body}");
    Ok((form, UploadReport { status, body, echo }))
}

fn ensure_readable(path: &Path) -> Result<(), Error> {
    File::open(path).map(|_| ()).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to open {}", path.display()))
            .with_hint("Pass existing files, or run from a directory containing ./files/.")
            .with_source(err)
    })
}

fn base_name(path: &Path) -> Result<String, Error> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("{} has no file name", path.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::{Form, FormFile, UploadConfig, UploadEcho, build_form, upload};
    use crate::core::error::ErrorKind;
    use serde_json::json;
    use std::path::PathBuf;
    use time::OffsetDateTime;

    fn fixture_config(dir: &std::path::Path) -> UploadConfig {
        let hello = dir.join("hello.txt");
        let goodbye = dir.join("goodbye.txt");
        std::fs::write(&hello, "hello\n").expect("write hello");
        std::fs::write(&goodbye, "goodbye\n").expect("write goodbye");
        UploadConfig {
            files: vec![hello, goodbye],
            ..UploadConfig::default()
        }
    }

    #[test]
    fn default_config_matches_fixtures() {
        let config = UploadConfig::default();
        assert_eq!(config.url, "https://httpbin.org/post");
        assert_eq!(config.timeout.as_secs(), 60);
        assert_eq!(
            config.files,
            vec![
                PathBuf::from("./files/hello.txt"),
                PathBuf::from("./files/goodbye.txt")
            ]
        );
    }

    #[test]
    fn form_has_fields_then_numbered_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = fixture_config(temp.path());
        let now = OffsetDateTime::from_unix_timestamp(1_136_214_245).expect("ts");
        let form = build_form(&config, now).expect("form");

        assert_eq!(form.fields[0], ("date".to_string(), "2006-01-02T15:04:05Z".to_string()));
        assert_eq!(form.fields[1].0, "description");
        assert_eq!(form.files.len(), 2);
        assert_eq!(form.files[0].field, "file1");
        assert_eq!(form.files[0].file_name, "hello.txt");
        assert_eq!(form.files[1].field, "file2");
        assert_eq!(form.files[1].file_name, "goodbye.txt");

        let body = String::from_utf8(form.body.clone()).expect("utf8");
        assert!(form.content_type.starts_with("multipart/form-data; boundary="));
        assert!(body.contains("name=\"file2\"; filename=\"goodbye.txt\""));
        assert!(!body.contains(temp.path().to_str().expect("path")));
        assert!(body.ends_with("--\r\n"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = UploadConfig {
            url: "http://127.0.0.1:9/post".to_string(),
            files: vec![temp.path().join("absent.txt")],
            ..UploadConfig::default()
        };
        let err = upload(&config).expect_err("missing file");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.hint().is_some());
    }

    #[test]
    fn non_http_url_is_usage_error() {
        let config = UploadConfig {
            url: "file:///etc/passwd".to_string(),
            ..UploadConfig::default()
        };
        let err = upload(&config).expect_err("scheme");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn echo_matching_accepts_httpbin_shape() {
        let form = Form {
            content_type: String::new(),
            body: Vec::new(),
            fields: vec![("description".to_string(), "files".to_string())],
            files: vec![FormFile {
                field: "file1".to_string(),
                file_name: "hello.txt".to_string(),
                contents: b"hello\n".to_vec(),
            }],
        };
        let echo: UploadEcho = serde_json::from_value(json!({
            "form": {"description": "files"},
            "files": {"file1": "hello\n"},
            "headers": {}
        }))
        .expect("echo");
        assert!(echo.contains_form(&form));

        let partial: UploadEcho =
            serde_json::from_value(json!({"form": {"description": "files"}})).expect("echo");
        assert!(!partial.contains_form(&form));
    }
}

//! Purpose: Encode `multipart/form-data` request bodies (RFC 7578).
//! Exports: `MultipartWriter`.
//! Role: In-memory writer; text fields and file parts are appended in call order.
//! Invariants: Boundaries are 1-70 characters from the RFC 2046 set and never end in a space.
//! Invariants: `"` and `\` in field and file names are backslash-escaped.
use getrandom::fill as fill_random;
use std::io::Read;

use crate::core::error::{Error, ErrorKind};

const BOUNDARY_BYTES: usize = 30;
const MAX_BOUNDARY_LEN: usize = 70;

#[derive(Debug)]
pub struct MultipartWriter {
    boundary: String,
    body: Vec<u8>,
    parts: usize,
}

impl MultipartWriter {
    /// Writer with a random boundary.
    pub fn new() -> Result<Self, Error> {
        let mut bytes = [0u8; BOUNDARY_BYTES];
        fill_random(&mut bytes).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message(format!("failed to generate multipart boundary: {err}"))
        })?;
        Ok(Self::from_valid_boundary(hex_encode(&bytes)))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Result<Self, Error> {
        let boundary = boundary.into();
        validate_boundary(&boundary)?;
        Ok(Self::from_valid_boundary(boundary))
    }

    fn from_valid_boundary(boundary: String) -> Self {
        Self {
            boundary,
            body: Vec::new(),
            parts: 0,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        let boundary = &self.boundary;
        if boundary.contains(needs_quoting) {
            format!("multipart/form-data; boundary=\"{boundary}\"")
        } else {
            format!("multipart/form-data; boundary={boundary}")
        }
    }

    pub fn write_field(&mut self, name: &str, value: &str) {
        let disposition = format!("form-data; name=\"{}\"", escape_quotes(name));
        self.start_part(&[("Content-Disposition", disposition)]);
        self.body.extend_from_slice(value.as_bytes());
    }

    /// Appends a file part, copying `contents` to the end.
    pub fn write_file<R: Read>(
        &mut self,
        field: &str,
        file_name: &str,
        mut contents: R,
    ) -> Result<u64, Error> {
        let disposition = format!(
            "form-data; name=\"{}\"; filename=\"{}\"",
            escape_quotes(field),
            escape_quotes(file_name)
        );
        self.start_part(&[
            ("Content-Disposition", disposition),
            ("Content-Type", "application/octet-stream".to_string()),
        ]);
        std::io::copy(&mut contents, &mut self.body).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to copy file part {file_name}"))
                .with_source(err)
        })
    }

    /// Writes the closing delimiter and returns the encoded body.
    pub fn finish(mut self) -> Vec<u8> {
        if self.parts > 0 {
            self.body.extend_from_slice(b"\r\n");
        }
        self.body.extend_from_slice(b"--");
        self.body.extend_from_slice(self.boundary.as_bytes());
        self.body.extend_from_slice(b"--\r\n");
        self.body
    }

    fn start_part(&mut self, headers: &[(&str, String)]) {
        if self.parts > 0 {
            self.body.extend_from_slice(b"\r\n");
        }
        self.body.extend_from_slice(b"--");
        self.body.extend_from_slice(self.boundary.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        for (name, value) in headers {
            self.body.extend_from_slice(name.as_bytes());
            self.body.extend_from_slice(b": ");
            self.body.extend_from_slice(value.as_bytes());
            self.body.extend_from_slice(b"\r\n");
        }
        self.body.extend_from_slice(b"\r\n");
        self.parts += 1;
    }
}

fn validate_boundary(boundary: &str) -> Result<(), Error> {
    if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("multipart boundary must be 1-70 characters"));
    }
    if boundary.ends_with(' ') {
        return Err(
            Error::new(ErrorKind::Usage).with_message("multipart boundary must not end in a space")
        );
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || "'()+_,-./:=? ".contains(c);
    if !boundary.chars().all(allowed) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("multipart boundary contains invalid characters"));
    }
    Ok(())
}

fn needs_quoting(c: char) -> bool {
    "()<>@,;:\\\"/[]?= ".contains(c)
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(nibble_hex(byte >> 4));
        out.push(nibble_hex(byte & 0x0f));
    }
    out
}

fn nibble_hex(nibble: u8) -> char {
    match nibble {
        0..=9 => char::from(b'0' + nibble),
        _ => char::from(b'a' + (nibble - 10)),
    }
}

#[cfg(test)]
mod tests {
    use super::MultipartWriter;
    use crate::core::error::ErrorKind;

    #[test]
    fn random_boundary_is_sixty_hex_chars() {
        let writer = MultipartWriter::new().expect("writer");
        assert_eq!(writer.boundary().len(), 60);
        assert!(writer.boundary().chars().all(|c| c.is_ascii_hexdigit()));
        let other = MultipartWriter::new().expect("writer");
        assert_ne!(writer.boundary(), other.boundary());
    }

    #[test]
    fn encodes_fields_and_files_in_order() {
        let mut writer = MultipartWriter::with_boundary("xyz").expect("writer");
        writer.write_field("description", "Form values");
        writer
            .write_file("file1", "hello.txt", &b"hi\n"[..])
            .expect("file");
        assert_eq!(writer.content_type(), "multipart/form-data; boundary=xyz");
        let body = String::from_utf8(writer.finish()).expect("utf8");
        let expected = concat!(
            "--xyz\r\n",
            "Content-Disposition: form-data; name=\"description\"\r\n",
            "\r\n",
            "Form values\r\n",
            "--xyz\r\n",
            "Content-Disposition: form-data; name=\"file1\"; filename=\"hello.txt\"\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
            "hi\n\r\n",
            "--xyz--\r\n",
        );
        assert_eq!(body, expected);
    }

    #[test]
    fn empty_form_is_only_the_close_delimiter() {
        let writer = MultipartWriter::with_boundary("b").expect("writer");
        assert_eq!(writer.finish(), b"--b--\r\n");
    }

    #[test]
    fn names_are_escaped() {
        let mut writer = MultipartWriter::with_boundary("b").expect("writer");
        writer.write_field("say \"hi\"", "x");
        let body = String::from_utf8(writer.finish()).expect("utf8");
        assert!(body.contains(r#"name="say \"hi\"""#));
    }

    #[test]
    fn boundary_with_special_chars_is_quoted() {
        let writer = MultipartWriter::with_boundary("a:b").expect("writer");
        assert_eq!(
            writer.content_type(),
            "multipart/form-data; boundary=\"a:b\""
        );
    }

    #[test]
    fn invalid_boundaries_are_rejected() {
        let too_long = "x".repeat(71);
        for boundary in ["", "trailing ", "semi;colon", too_long.as_str()] {
            let err = MultipartWriter::with_boundary(boundary).expect_err("invalid");
            assert_eq!(err.kind(), ErrorKind::Usage, "boundary {boundary:?}");
        }
    }
}

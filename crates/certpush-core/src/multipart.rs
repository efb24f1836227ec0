//! `multipart/form-data` encoding for the certificate import call.
//!
//! DSM wants text fields and PEM files in one body; the layout here is the
//! plain RFC 7578 shape: text fields first, then files, CRLF line endings.

use uuid::Uuid;

const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub filename: String,
    pub content: Vec<u8>,
    pub content_type: String,
}

impl FilePart {
    pub fn new(
        filename: impl Into<String>,
        content: impl Into<Vec<u8>>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            content_type: content_type.into(),
        }
    }
}

/// Ordered set of text fields and file attachments.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    fields: Vec<(String, String)>,
    files: Vec<(String, FilePart)>,
}

/// Encoded payload plus the matching `Content-Type` header value.
#[derive(Debug, Clone)]
pub struct EncodedForm {
    pub body: Vec<u8>,
    pub content_type: String,
    pub boundary: String,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(mut self, name: impl Into<String>, part: FilePart) -> Self {
        self.files.push((name.into(), part));
        self
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn files(&self) -> &[(String, FilePart)] {
        &self.files
    }

    /// Encode with a fresh random boundary that does not occur anywhere in
    /// the field values or file contents.
    pub fn encode(&self) -> EncodedForm {
        loop {
            let boundary = Uuid::new_v4().simple().to_string();
            if !self.contains(boundary.as_bytes()) {
                return self.encode_with_boundary(&boundary);
            }
        }
    }

    fn contains(&self, needle: &[u8]) -> bool {
        self.fields
            .iter()
            .any(|(_, value)| contains_bytes(value.as_bytes(), needle))
            || self
                .files
                .iter()
                .any(|(_, part)| contains_bytes(&part.content, needle))
    }

    fn encode_with_boundary(&self, boundary: &str) -> EncodedForm {
        let delimiter = format!("--{boundary}");
        let mut body = Vec::new();

        for (name, value) in &self.fields {
            push_line(&mut body, delimiter.as_bytes());
            push_line(
                &mut body,
                format!("Content-Disposition: form-data; name=\"{name}\"").as_bytes(),
            );
            push_line(&mut body, b"");
            push_line(&mut body, value.as_bytes());
        }

        for (name, part) in &self.files {
            push_line(&mut body, delimiter.as_bytes());
            push_line(
                &mut body,
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{}\"",
                    part.filename
                )
                .as_bytes(),
            );
            push_line(
                &mut body,
                format!("Content-Type: {}", part.content_type).as_bytes(),
            );
            push_line(&mut body, b"");
            push_line(&mut body, &part.content);
        }

        push_line(&mut body, format!("{delimiter}--").as_bytes());

        EncodedForm {
            body,
            content_type: format!("multipart/form-data; boundary={boundary}"),
            boundary: boundary.to_string(),
        }
    }
}

fn push_line(body: &mut Vec<u8>, line: &[u8]) {
    body.extend_from_slice(line);
    body.extend_from_slice(CRLF);
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

//! Buffer-scanning `multipart/form-data` decoder.
//!
//! The whole request body is already in memory, so the decoder works on a
//! byte slice: it locates every `--<boundary>` delimiter, splits each part at
//! its blank line, and reads `Content-Disposition` / `Content-Type` from the
//! header block. Parts whose header block cannot be found are skipped.

use crate::models::upload::FilePart;
use bytes::Bytes;
use thiserror::Error;

const HEADER_BODY_SEPARATOR: &[u8] = b"\r\n\r\n";
const CRLF: &[u8] = b"\r\n";
const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
const TOKEN_FIELD: &str = "token";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MultipartError {
    #[error("content type does not carry a multipart boundary")]
    MissingBoundary,
}

/// Everything recovered from one request body.
#[derive(Debug, Default)]
pub struct DecodedForm {
    pub token: Option<String>,
    pub files: Vec<FilePart>,
}

/// Extract the boundary parameter from a `Content-Type` header value.
pub fn extract_boundary(content_type: &str) -> Result<String, MultipartError> {
    let lower = content_type.to_ascii_lowercase();
    let start = lower
        .find("boundary=")
        .map(|idx| idx + "boundary=".len())
        .ok_or(MultipartError::MissingBoundary)?;
    let rest = &content_type[start..];
    let raw = rest.split(';').next().unwrap_or("").trim();
    let boundary = raw.trim_matches('"');
    if boundary.is_empty() {
        return Err(MultipartError::MissingBoundary);
    }
    Ok(boundary.to_string())
}

/// Decode `body` using the boundary advertised in `content_type`.
///
/// Files keep their order of appearance and share `body`'s allocation. The
/// first non-empty `token` field without a filename wins.
pub fn decode(body: &Bytes, content_type: &str) -> Result<DecodedForm, MultipartError> {
    let boundary = extract_boundary(content_type)?;
    let delimiter = format!("--{}", boundary).into_bytes();

    let mut positions = Vec::new();
    let mut cursor = 0;
    while let Some(pos) = find(body, &delimiter, cursor) {
        positions.push(pos);
        cursor = pos + delimiter.len();
    }

    let mut form = DecodedForm::default();
    for pair in positions.windows(2) {
        let segment = &body[pair[0] + delimiter.len()..pair[1]];
        let Some(part) = split_part(segment) else {
            continue;
        };
        let headers = parse_part_headers(part.headers);

        match headers.filename {
            Some(filename) => {
                // Browsers send an empty filename for an unused file input.
                if filename.is_empty() {
                    continue;
                }
                form.files.push(FilePart {
                    filename,
                    mime_type: headers
                        .content_type
                        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
                    data: body.slice_ref(part.content),
                });
            }
            None if headers.name.as_deref() == Some(TOKEN_FIELD) => {
                let value = String::from_utf8_lossy(part.content).trim().to_string();
                if form.token.is_none() && !value.is_empty() {
                    form.token = Some(value);
                }
            }
            None => {}
        }
    }

    Ok(form)
}

struct RawPart<'a> {
    headers: &'a [u8],
    content: &'a [u8],
}

/// Split the bytes between two delimiters into header block and content.
fn split_part(segment: &[u8]) -> Option<RawPart<'_>> {
    // The closing delimiter is `--<boundary>--`; nothing follows it.
    if segment.starts_with(b"--") {
        return None;
    }
    let segment = segment.strip_prefix(CRLF).unwrap_or(segment);
    let sep = find(segment, HEADER_BODY_SEPARATOR, 0)?;
    let headers = &segment[..sep];
    let content = &segment[sep + HEADER_BODY_SEPARATOR.len()..];
    let content = content.strip_suffix(CRLF).unwrap_or(content);
    Some(RawPart { headers, content })
}

#[derive(Debug, Default)]
struct PartHeaders {
    name: Option<String>,
    filename: Option<String>,
    content_type: Option<String>,
}

fn parse_part_headers(raw: &[u8]) -> PartHeaders {
    let text = String::from_utf8_lossy(raw);
    let mut headers = PartHeaders::default();

    for line in text.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if key.eq_ignore_ascii_case("content-disposition") {
            for param in split_params(value).into_iter().skip(1) {
                let Some((pkey, pvalue)) = param.split_once('=') else {
                    continue;
                };
                let pvalue = unquote(pvalue.trim());
                match pkey.trim().to_ascii_lowercase().as_str() {
                    "name" => headers.name = Some(pvalue),
                    "filename" => headers.filename = Some(pvalue),
                    _ => {}
                }
            }
        } else if key.eq_ignore_ascii_case("content-type") && !value.is_empty() {
            headers.content_type = Some(value.to_string());
        }
    }

    headers
}

/// Split header parameters on `;`, leaving separators inside quoted
/// strings alone.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&value[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

/// Position of the first `needle` in `haystack` at or after `from`.
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

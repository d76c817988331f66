//! JSON decoding with error context (serde path, position, and a snippet of
//! the offending line) for API bodies and cached documents.

use std::io::Read;

use anyhow::Result;
use serde::de::DeserializeOwned;

/// Characters of the offending line shown on each side of the error column.
const SNIPPET_RADIUS: usize = 12;

/// Decode an in-memory body, describing failures with the serde path and a
/// snippet of the line the error points at.
pub fn parse_json_with_context<T: DeserializeOwned>(body: &str) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let (line, column) = (err.inner().line(), err.inner().column());
        let message = describe(&err);
        let snippet = snippet(body, line, column);
        anyhow::anyhow!("{message} (line {line} col {column})\n{snippet}")
    })
}

/// Decode from a reader. Only the serde path and position are reported since
/// the input is not retained.
pub fn read_json_with_context<T: DeserializeOwned, R: Read>(reader: R) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_reader(reader);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let (line, column) = (err.inner().line(), err.inner().column());
        anyhow::anyhow!("{} (line {line} col {column})", describe(&err))
    })
}

fn describe(err: &serde_path_to_error::Error<serde_json::Error>) -> String {
    let inner = err.inner();
    let raw = inner.to_string();
    let location = format!(" at line {} column {}", inner.line(), inner.column());
    let message = simplify(raw.strip_suffix(&location).unwrap_or(&raw));

    let path = err.path().to_string();
    if path.is_empty() || path == "." {
        message
    } else {
        format!("at path '{path}': {message}")
    }
}

/// Rewrite "invalid type: X, expected Y" as "expected Y, got X".
fn simplify(message: &str) -> String {
    let Some(rest) = message
        .find("invalid type: ")
        .map(|start| &message[start + "invalid type: ".len()..])
    else {
        return message.to_string();
    };

    match rest.split_once(", expected ") {
        Some((actual, expected)) => format!("expected {}, got {actual}", expected.trim()),
        None => message.to_string(),
    }
}

fn snippet(body: &str, line: usize, column: usize) -> String {
    let Some(text) = body.lines().nth(line.saturating_sub(1)).filter(|l| !l.is_empty()) else {
        return "(empty line)".to_string();
    };

    // serde_json columns are 1-based byte offsets
    let mut at = column.saturating_sub(1).min(text.len());
    while !text.is_char_boundary(at) {
        at -= 1;
    }
    let mut start = at.saturating_sub(SNIPPET_RADIUS);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (at + SNIPPET_RADIUS).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }

    let marker_offset = text[start..at].chars().count();
    format!(
        "...{}...\n   {}^",
        &text[start..end],
        " ".repeat(marker_offset)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Place {
        #[allow(dead_code)]
        id: String,
        #[allow(dead_code)]
        city: City,
    }

    #[derive(Debug, Deserialize)]
    struct City {
        #[allow(dead_code)]
        timezone: String,
    }

    #[derive(Debug, Deserialize)]
    struct Places {
        #[allow(dead_code)]
        items: Vec<Place>,
    }

    #[test]
    fn simplify_invalid_type() {
        assert_eq!(
            simplify("invalid type: null, expected a string"),
            "expected a string, got null"
        );
    }

    #[test]
    fn simplify_passes_other_messages_through() {
        assert_eq!(simplify("EOF while parsing a value"), "EOF while parsing a value");
    }

    #[test]
    fn parse_error_names_the_path() {
        let body = r#"{
            "items": [
                {"id": "cinema-1", "city": {"timezone": "Europe/Moscow"}},
                {"id": "cinema-2", "city": {"timezone": null}}
            ]
        }"#;

        let err = parse_json_with_context::<Places>(body).unwrap_err().to_string();
        assert!(err.contains("items[1].city.timezone"), "{err}");
        assert!(err.contains("expected a string, got null"), "{err}");
        assert!(err.contains('^'), "{err}");
    }

    #[test]
    fn snippet_handles_multibyte_lines() {
        let body = r#"{"items": [{"id": "кинотеатр", "city": {"timezone": 5}}]}"#;
        let err = parse_json_with_context::<Places>(body).unwrap_err().to_string();
        assert!(err.contains("items[0].city.timezone"), "{err}");
    }

    #[test]
    fn reader_errors_carry_path() {
        let body = br#"{"items": [{"id": 1, "city": {"timezone": "UTC"}}]}"#;
        let err = read_json_with_context::<Places, _>(&body[..])
            .unwrap_err()
            .to_string();
        assert!(err.contains("items[0].id"), "{err}");
    }

    #[test]
    fn valid_documents_decode() {
        let body = r#"{"items": [{"id": "c1", "city": {"timezone": "Asia/Yekaterinburg"}}]}"#;
        let places: Places = parse_json_with_context(body).unwrap();
        assert_eq!(places.items.len(), 1);
    }
}

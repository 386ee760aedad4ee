//! Incremental JSON parser
//!
//! Bracket-matching extraction of complete JSON objects from text that may
//! carry prose around them, such as model output or a raw document dump:
//! - Buffer: 1MB maximum
//! - Algorithm: O(n) single pass, braces inside strings ignored
//! - Recovery: an opening brace that never closes is dropped and the scan
//!   restarts just after it

use crate::errors::{PipelineError, Result};
use serde_json::Value;

/// Maximum buffer size (1MB)
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// Incremental JSON parser
#[derive(Debug)]
pub struct JsonParser {
    /// Accumulation buffer
    buffer: Vec<u8>,

    /// Maximum buffer size
    max_buffer_size: usize,
}

impl JsonParser {
    /// Create parser with custom buffer capacity
    pub fn with_capacity(max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_buffer_size,
        }
    }

    /// Add bytes and attempt to extract the next complete object
    ///
    /// ```text
    /// depth ← 0, start ← None
    /// for each byte bᵢ outside a string literal:
    ///   '{' → if depth = 0: start ← i; depth ← depth + 1
    ///   '}' → depth ← depth - 1; if depth = 0 and start set: return B[start..=i]
    /// return None
    /// ```
    pub fn add_bytes(&mut self, bytes: &[u8]) -> Result<Option<String>> {
        if self.buffer.len() + bytes.len() > self.max_buffer_size {
            return Err(PipelineError::JsonParseError(format!(
                "Buffer overflow: {} bytes exceeds maximum {}",
                self.buffer.len() + bytes.len(),
                self.max_buffer_size
            )));
        }

        self.buffer.extend_from_slice(bytes);
        self.try_extract_json()
    }

    /// Extract the next complete object already in the buffer
    pub fn next_object(&mut self) -> Result<Option<String>> {
        self.try_extract_json()
    }

    fn try_extract_json(&mut self) -> Result<Option<String>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        if let Some((start, end)) = self.find_complete_json()? {
            let json_str = String::from_utf8_lossy(&self.buffer[start..=end]).to_string();
            self.buffer.drain(..=end);
            return Ok(Some(json_str));
        }

        Ok(None)
    }

    /// Returns `(start, end)` of the first balanced object, inclusive
    fn find_complete_json(&self) -> Result<Option<(usize, usize)>> {
        let mut depth: i32 = 0;
        let mut start: Option<usize> = None;
        let mut in_string = false;
        let mut escape_next = false;

        for (i, &byte) in self.buffer.iter().enumerate() {
            if escape_next {
                escape_next = false;
                continue;
            }

            if byte == b'\\' && in_string {
                escape_next = true;
                continue;
            }

            // Quotes only matter once an object has opened; prose apostrophes
            // and stray quotes before it are skipped
            if byte == b'"' && start.is_some() {
                in_string = !in_string;
                continue;
            }

            if in_string {
                continue;
            }

            match byte {
                b'{' => {
                    if depth == 0 {
                        start = Some(i);
                    }
                    depth += 1;
                }
                b'}' if start.is_some() => {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start {
                            return Ok(Some((s, i)));
                        }
                    }
                    if depth < 0 {
                        return Err(PipelineError::JsonParseError(
                            "Mismatched braces: too many closing braces".to_string(),
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(None)
    }

    /// Parse an extracted object into a JSON mapping
    pub fn parse_object(&self, json_str: &str) -> Result<Value> {
        let value: Value = serde_json::from_str(json_str)
            .map_err(|e| PipelineError::JsonParseError(format!("Failed to parse object: {}", e)))?;
        if !value.is_object() {
            return Err(PipelineError::JsonParseError(
                "Extracted JSON is not an object".to_string(),
            ));
        }
        Ok(value)
    }

    /// Drop everything up to and including the first `{`; false when there is none
    pub fn skip_unclosed_start(&mut self) -> bool {
        match self.buffer.iter().position(|&b| b == b'{') {
            Some(pos) => {
                self.buffer.drain(..=pos);
                true
            }
            None => false,
        }
    }
}

/// First balanced JSON object in `text` that parses as a mapping.
/// Candidates that fail to parse are skipped.
pub fn extract_first_object(text: &str) -> Option<Value> {
    let mut parser = JsonParser::with_capacity(text.len().max(1));
    let mut candidate = parser.add_bytes(text.as_bytes());

    loop {
        match candidate {
            Ok(Some(json)) => {
                if let Ok(value) = parser.parse_object(&json) {
                    return Some(value);
                }
            }
            // An opening brace that never closes would hide every later object
            Ok(None) | Err(_) => {
                if !parser.skip_unclosed_start() {
                    return None;
                }
            }
        }
        candidate = parser.next_object();
    }
}

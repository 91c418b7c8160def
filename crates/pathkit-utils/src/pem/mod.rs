//! PEM armor parsing and generation.

use pathkit_types::PemError;

/// A parsed PEM block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemBlock {
    /// The label (e.g., "CERTIFICATE", "X509 CRL").
    pub label: String,
    /// The decoded binary data.
    pub data: Vec<u8>,
}

const BEGIN_PREFIX: &str = "-----BEGIN ";
const END_PREFIX: &str = "-----END ";
const DASHES_SUFFIX: &str = "-----";

/// Parse every PEM block in `input`. Text outside blocks is ignored.
pub fn parse(input: &str) -> Result<Vec<PemBlock>, PemError> {
    let mut blocks = Vec::new();
    let mut lines = input.lines().map(str::trim);

    while let Some(line) = lines.next() {
        let Some(label) = line
            .strip_prefix(BEGIN_PREFIX)
            .and_then(|s| s.strip_suffix(DASHES_SUFFIX))
        else {
            continue;
        };

        let mut body = String::new();
        let mut end_label = None;
        for inner in lines.by_ref() {
            if let Some(end) = inner
                .strip_prefix(END_PREFIX)
                .and_then(|s| s.strip_suffix(DASHES_SUFFIX))
            {
                end_label = Some(end);
                break;
            }
            body.push_str(inner);
        }
        match end_label {
            None => return Err(PemError::MissingEnd(label.to_string())),
            Some(end) if end != label => {
                return Err(PemError::LabelMismatch {
                    begin: label.to_string(),
                    end: end.to_string(),
                })
            }
            Some(_) => {}
        }
        blocks.push(PemBlock {
            label: label.to_string(),
            data: crate::base64::decode(&body)?,
        });
    }

    Ok(blocks)
}

/// Decode the first block carrying `label`.
pub fn find(input: &str, label: &str) -> Result<Vec<u8>, PemError> {
    parse(input)?
        .into_iter()
        .find(|b| b.label == label)
        .map(|b| b.data)
        .ok_or_else(|| PemError::NoBlock(label.to_string()))
}

/// Encode binary data as a PEM string with the given label, wrapped at
/// 64 characters per line.
pub fn encode(label: &str, data: &[u8]) -> String {
    let body = crate::base64::encode(data);
    let mut output = format!("{BEGIN_PREFIX}{label}{DASHES_SUFFIX}\n");
    let mut rest = body.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(64));
        output.push_str(line);
        output.push('\n');
        rest = tail;
    }
    output.push_str(&format!("{END_PREFIX}{label}{DASHES_SUFFIX}\n"));
    output
}

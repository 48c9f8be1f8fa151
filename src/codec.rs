// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Reversible binary-to-text encoding for audio payloads embedded in snapshots.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::Result;
use crate::sound::Blob;

/// Encodes a payload as padded standard base64.
pub fn encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decodes base64 text back into a blob tagged with the given MIME type. Surrounding
/// whitespace and embedded line breaks are tolerated.
pub fn decode(text: &str, mime: &str) -> Result<Blob> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = BASE64.decode(compact.as_bytes())?;
    Ok(Blob::new(mime, bytes))
}

#[cfg(test)]
mod test {
    use crate::error::Error;

    use super::*;

    #[test]
    fn test_round_trip_all_byte_values() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(1031).collect();
        let text = encode(&bytes);
        let blob = decode(&text, "audio/wav").unwrap();
        assert_eq!(blob.bytes(), bytes.as_slice());
        assert_eq!(blob.mime(), "audio/wav");
    }

    #[test]
    fn test_round_trip_empty() {
        assert_eq!(encode(&[]), "");
        assert!(decode("", "audio/mpeg").unwrap().is_empty());
    }

    #[test]
    fn test_decode_tolerates_line_breaks() {
        let text = "AAEC\r\nA/8=\n";
        assert_eq!(decode(text, "audio/ogg").unwrap().bytes(), &[0, 1, 2, 3, 255]);
    }

    #[test]
    fn test_decode_invalid() {
        assert!(matches!(
            decode("not base64!", "audio/mpeg"),
            Err(Error::Decode(_))
        ));
    }
}

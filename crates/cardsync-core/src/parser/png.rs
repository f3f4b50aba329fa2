//! Minimal PNG chunk walker for text metadata.
//!
//! The container framing is validated (signature, chunk lengths, chunk
//! CRCs, `IEND`); image data is not decoded.

use super::ParseError;
use flate2::read::ZlibDecoder;
use flate2::Crc;
use std::io::Read;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Upper bound for an inflated text chunk.
const MAX_INFLATED_TEXT: u64 = 64 * 1024 * 1024;

/// A decoded `tEXt`, `zTXt` or `iTXt` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub keyword: String,
    pub text: String,
}

/// Collect every text chunk in a PNG byte buffer.
pub fn read_text_chunks(bytes: &[u8]) -> Result<Vec<TextChunk>, ParseError> {
    if bytes.len() < PNG_SIGNATURE.len() || bytes[..8] != PNG_SIGNATURE {
        return Err(ParseError::NotPng);
    }

    let mut chunks = Vec::new();
    let mut offset = PNG_SIGNATURE.len();
    let mut saw_end = false;

    while offset < bytes.len() {
        if bytes.len() - offset < 12 {
            return Err(ParseError::CorruptContainer(format!(
                "truncated chunk header at byte {offset}"
            )));
        }

        let length = u32::from_be_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]) as usize;
        let kind = &bytes[offset + 4..offset + 8];
        let data_start = offset + 8;
        let data_end = data_start
            .checked_add(length)
            .filter(|end| end.saturating_add(4) <= bytes.len())
            .ok_or_else(|| {
                ParseError::CorruptContainer(format!(
                    "chunk {} at byte {offset} overruns the file",
                    String::from_utf8_lossy(kind)
                ))
            })?;
        let data = &bytes[data_start..data_end];

        let stored_crc = u32::from_be_bytes([
            bytes[data_end],
            bytes[data_end + 1],
            bytes[data_end + 2],
            bytes[data_end + 3],
        ]);
        let mut crc = Crc::new();
        crc.update(&bytes[offset + 4..data_end]);
        if crc.sum() != stored_crc {
            return Err(ParseError::CorruptContainer(format!(
                "CRC mismatch in chunk {} at byte {offset}",
                String::from_utf8_lossy(kind)
            )));
        }

        match kind {
            b"tEXt" => chunks.push(decode_text(data)?),
            b"zTXt" => chunks.push(decode_ztxt(data)?),
            b"iTXt" => chunks.push(decode_itxt(data)?),
            b"IEND" => {
                saw_end = true;
                break;
            }
            _ => {}
        }

        offset = data_end + 4;
    }

    if !saw_end {
        return Err(ParseError::CorruptContainer("missing IEND chunk".to_string()));
    }

    Ok(chunks)
}

fn split_keyword(data: &[u8]) -> Result<(String, &[u8]), ParseError> {
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ParseError::CorruptContainer("text chunk without keyword".to_string()))?;
    Ok((latin1(&data[..nul]), &data[nul + 1..]))
}

fn decode_text(data: &[u8]) -> Result<TextChunk, ParseError> {
    let (keyword, rest) = split_keyword(data)?;
    Ok(TextChunk {
        keyword,
        text: latin1(rest),
    })
}

fn decode_ztxt(data: &[u8]) -> Result<TextChunk, ParseError> {
    let (keyword, rest) = split_keyword(data)?;
    let compressed = rest
        .get(1..)
        .ok_or_else(|| ParseError::CorruptContainer("empty zTXt chunk".to_string()))?;
    Ok(TextChunk {
        keyword,
        text: latin1(&inflate(compressed)?),
    })
}

fn decode_itxt(data: &[u8]) -> Result<TextChunk, ParseError> {
    let (keyword, rest) = split_keyword(data)?;
    if rest.len() < 2 {
        return Err(ParseError::CorruptContainer("short iTXt chunk".to_string()));
    }
    let compressed = rest[0] == 1;
    let rest = &rest[2..];

    // language tag, then translated keyword, both NUL-terminated
    let lang_end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ParseError::CorruptContainer("iTXt without language tag".to_string()))?;
    let rest = &rest[lang_end + 1..];
    let translated_end = rest.iter().position(|&b| b == 0).ok_or_else(|| {
        ParseError::CorruptContainer("iTXt without translated keyword".to_string())
    })?;
    let body = &rest[translated_end + 1..];

    let raw = if compressed { inflate(body)? } else { body.to_vec() };
    let text = String::from_utf8(raw)
        .map_err(|_| ParseError::CorruptContainer("iTXt text is not UTF-8".to_string()))?;

    Ok(TextChunk { keyword, text })
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .take(MAX_INFLATED_TEXT)
        .read_to_end(&mut out)
        .map_err(|e| ParseError::CorruptContainer(format!("bad compressed text: {e}")))?;
    Ok(out)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn push_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        let mut crc = flate2::Crc::new();
        crc.update(kind);
        crc.update(data);
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&crc.sum().to_be_bytes());
    }

    /// Build a minimal PNG holding the given raw chunks.
    pub(crate) fn png_with_chunks(chunks: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        push_chunk(&mut out, b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 6, 0, 0, 0]);
        for (kind, data) in chunks {
            push_chunk(&mut out, kind, data);
        }
        push_chunk(&mut out, b"IEND", &[]);
        out
    }

    /// Insert a chunk just before `IEND` of an encoded PNG.
    pub(crate) fn insert_before_iend(png: &[u8], kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
        let iend = png.len() - 12;
        let mut out = png[..iend].to_vec();
        push_chunk(&mut out, kind, data);
        out.extend_from_slice(&png[iend..]);
        out
    }

    pub(crate) fn text_chunk(keyword: &str, text: &str) -> (&'static [u8; 4], Vec<u8>) {
        let mut data = keyword.as_bytes().to_vec();
        data.push(0);
        data.extend_from_slice(text.as_bytes());
        (b"tEXt", data)
    }

    #[test]
    fn test_reads_text_chunks() {
        let png = png_with_chunks(&[text_chunk("chara", "abc"), text_chunk("Software", "x")]);
        let chunks = read_text_chunks(&png).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].keyword, "chara");
        assert_eq!(chunks[0].text, "abc");
    }

    #[test]
    fn test_reads_compressed_itxt() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all("héllo".as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut data = b"ccv3\0".to_vec();
        data.extend_from_slice(&[1, 0]);
        data.extend_from_slice(b"en\0\0");
        data.extend_from_slice(&compressed);

        let png = png_with_chunks(&[(b"iTXt", data)]);
        let chunks = read_text_chunks(&png).unwrap();
        assert_eq!(chunks[0].keyword, "ccv3");
        assert_eq!(chunks[0].text, "héllo");
    }

    #[test]
    fn test_rejects_non_png() {
        assert!(matches!(
            read_text_chunks(b"GIF89a........"),
            Err(ParseError::NotPng)
        ));
    }

    #[test]
    fn test_rejects_bad_crc() {
        let mut png = png_with_chunks(&[text_chunk("chara", "abc")]);
        // Last CRC byte of the tEXt chunk, just before IEND.
        let crc_end = png.len() - 12;
        png[crc_end - 1] ^= 0xFF;
        match read_text_chunks(&png) {
            Err(ParseError::CorruptContainer(message)) => assert!(message.contains("tEXt")),
            other => panic!("expected CRC failure, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_truncated_chunk() {
        let mut png = png_with_chunks(&[text_chunk("chara", "abcdef")]);
        png.truncate(40);
        assert!(matches!(
            read_text_chunks(&png),
            Err(ParseError::CorruptContainer(_))
        ));
    }
}

use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::io::Write;
use tracing::info;

/// Serializes a value to JSON and uploads it to S3.
///
/// With `gzip`, the body is compressed and `.gz` is appended to `key`.
/// Returns the key actually written.
pub async fn write_json_to_s3(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    value: &impl Serialize,
    gzip: bool,
) -> anyhow::Result<String> {
    let json = serde_json::to_vec(value)?;

    let (body, key) = if gzip {
        (gzip_bytes(&json)?, format!("{key}.gz"))
    } else {
        (json, key.to_string())
    };

    let mut request = client
        .put_object()
        .bucket(bucket)
        .key(&key)
        .body(ByteStream::from(body))
        .content_type("application/json");
    if gzip {
        request = request.content_encoding("gzip");
    }
    request.send().await?;

    info!(bucket, key = %key, gzip, "Snapshot uploaded to S3");
    Ok(key)
}

fn gzip_bytes(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_gzip_round_trips() {
        let body = br#"{"success":true}"#;
        let compressed = gzip_bytes(body).unwrap();

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice()).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, body);
    }
}

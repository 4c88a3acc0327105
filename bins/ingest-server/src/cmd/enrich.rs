use tokio::io::{AsyncReadExt, AsyncWriteExt};

use ingest_engine::clock::{Clock, FixedClock, SystemClock};
use ingest_engine::TenantStamp;

use crate::config::EnrichArgs;
use crate::error::ServerError;

/// Enrich the JSON object on stdin and print the resulting line.
pub async fn run(args: EnrichArgs) -> Result<(), ServerError> {
    let mut payload = Vec::new();
    tokio::io::stdin().read_to_end(&mut payload).await?;

    let line = enrich_payload(&args, payload.trim_ascii_end())?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

fn enrich_payload(args: &EnrichArgs, payload: &[u8]) -> Result<String, ServerError> {
    let now = match args.now {
        Some(secs) => FixedClock::from_epoch_seconds(secs).now(),
        None => SystemClock.now(),
    };
    let stage = TenantStamp::new(args.tenant_field.clone(), args.timestamp_field.clone());
    Ok(stage.apply(payload, &args.tenant, now)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(now: Option<i64>) -> EnrichArgs {
        EnrichArgs {
            tenant: "acme".into(),
            now,
            tenant_field: "TenantId".into(),
            timestamp_field: "timestamp".into(),
        }
    }

    #[test]
    fn enriches_with_fixed_time() {
        let line = enrich_payload(&args(Some(42)), br#"{"a":1}"#).unwrap();
        assert!(line.ends_with("}\n"));
        for field in [r#""a":1"#, r#""TenantId":"acme""#, r#""timestamp":42"#] {
            assert!(line.contains(field), "{line}");
        }
    }

    #[test]
    fn rejects_non_objects() {
        let err = enrich_payload(&args(Some(0)), b"[1]").unwrap_err();
        assert!(matches!(err, ServerError::Enrich(_)));
    }
}

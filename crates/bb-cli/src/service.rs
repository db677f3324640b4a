//! Direct service commands: check, block, unblock, ping

use std::time::Duration;

use bb_core::wire::{self, BlockReply, RemoveReply};
use bb_core::{EngineConfig, IdKind, LookupShape, Notice, Verdict};
use bb_runtime::{HttpTransport, Transport};

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Runtime::new().map_err(|e| format!("Failed to start tokio runtime: {}", e))
}

fn transport(config: &EngineConfig, timeout: Duration) -> Result<HttpTransport, String> {
    HttpTransport::new(&config.server_url, timeout).map_err(|e| e.to_string())
}

pub fn cmd_check(
    config: &EngineConfig,
    timeout: Duration,
    ids: &[String],
    content: bool,
    single: bool,
) -> Result<(), String> {
    let ids: Vec<String> = ids
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect();
    if ids.is_empty() {
        return Err("No identifiers specified".to_string());
    }

    let kind = if content { IdKind::Content } else { IdKind::Subject };
    let (shape, limit) = if single {
        (LookupShape::Single, 1)
    } else {
        (LookupShape::Batched, config.batch_limit.max(1))
    };
    let transport = transport(config, timeout)?;

    runtime()?.block_on(async {
        for chunk in ids.chunks(limit) {
            let request = wire::lookup_request(kind, shape, chunk);
            let body = transport.send(&request).await.map_err(|e| e.to_string())?;
            let lookups = wire::decode_lookups(request.endpoint, chunk, &body).map_err(|e| e.to_string())?;

            for lookup in lookups {
                let verdict = match lookup.verdict {
                    Some(Verdict::Blocked) => "blocked",
                    Some(Verdict::NotBlocked) => "not blocked",
                    None => "unknown",
                };
                match lookup.owner {
                    Some(owner) => println!("{}\t{}\towner {}", lookup.id, verdict, owner),
                    None => println!("{}\t{}", lookup.id, verdict),
                }
            }
        }
        Ok::<(), String>(())
    })
}

pub fn cmd_block(config: &EngineConfig, timeout: Duration, mid: &str, name: &str) -> Result<(), String> {
    let (mid, name) = (mid.trim(), name.trim());
    if mid.is_empty() || name.is_empty() {
        return Err("Both --mid and --name are required".to_string());
    }
    let transport = transport(config, timeout)?;
    let body = runtime()?
        .block_on(transport.send(&wire::block_request(mid, name)))
        .map_err(|e| e.to_string())?;

    match BlockReply::decode(&body) {
        BlockReply::Ok => {
            println!("Blocked {} ({})", mid, name);
            Ok(())
        }
        BlockReply::InvalidIdentifier => Err(Notice::InvalidIdentifier.message().to_string()),
        BlockReply::StorageFailure => Err(Notice::StorageFailure.message().to_string()),
        BlockReply::Other(body) => Err(format!("Unexpected reply: {}", body)),
    }
}

pub fn cmd_unblock(config: &EngineConfig, timeout: Duration, mid: &str) -> Result<(), String> {
    let mid = mid.trim();
    if mid.is_empty() {
        return Err("--mid is required".to_string());
    }
    let transport = transport(config, timeout)?;
    let body = runtime()?
        .block_on(transport.send(&wire::remove_request(mid)))
        .map_err(|e| e.to_string())?;

    match RemoveReply::decode(&body) {
        RemoveReply::Ok => {
            println!("Unblocked {}", mid);
            Ok(())
        }
        RemoveReply::InvalidIdentifier => Err(Notice::InvalidIdentifier.message().to_string()),
        RemoveReply::Failed => Err(Notice::UnblockFailed.message().to_string()),
        RemoveReply::Other(body) => Err(format!("Unexpected reply: {}", body)),
    }
}

pub fn cmd_ping(config: &EngineConfig, timeout: Duration) -> Result<(), String> {
    let transport = transport(config, timeout)?;
    runtime()?
        .block_on(bb_runtime::ping(&transport))
        .map_err(|e| format!("{} is unreachable: {}", config.server_url, e))?;
    println!("{} is up", config.server_url);
    Ok(())
}

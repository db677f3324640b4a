//! Fixture replay
//!
//! Loads a captured page as a [`FixturePage`] and drives the scheduler over
//! it for a number of cycles. Lookups go to the live service, or to a
//! verdict file for offline runs.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use bb_core::memory::{FixturePage, MemoryHost};
use bb_core::wire::Endpoint;
use bb_core::{EngineConfig, FilterEngine, ServiceError, ServiceRequest};
use bb_runtime::{HttpTransport, Scheduler, Transport};

/// One canned answer: a bare `"True"`/`"False"` flag, or a content
/// answer carrying the owner.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Answer {
    Flag(String),
    Content { result: String, mid: Option<u64> },
}

impl Answer {
    fn flag(&self) -> &str {
        match self {
            Self::Flag(flag) => flag,
            Self::Content { result, .. } => result,
        }
    }

    fn owner(&self) -> Option<u64> {
        match self {
            Self::Flag(_) => None,
            Self::Content { mid, .. } => *mid,
        }
    }
}

/// Offline service answering from a verdict map. Unknown subjects are not
/// blocked; unknown content is unresolved. Mutations always succeed.
struct VerdictTransport {
    answers: BTreeMap<String, Answer>,
}

impl VerdictTransport {
    fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            answers: serde_json::from_str(text)?,
        })
    }

    fn ids(request: &ServiceRequest) -> Vec<&str> {
        request
            .params
            .first()
            .map(|(_, value)| value.split(',').collect())
            .unwrap_or_default()
    }

    fn subject_flag(&self, id: &str) -> &str {
        self.answers.get(id).map(Answer::flag).unwrap_or("False")
    }

    fn content_answer(&self, id: &str) -> (&str, Option<u64>) {
        match self.answers.get(id) {
            Some(answer) => (answer.flag(), answer.owner()),
            None => ("None", None),
        }
    }

    fn answer(&self, request: &ServiceRequest) -> String {
        let ids = Self::ids(request);
        match request.endpoint {
            Endpoint::IsExist => ids.first().map(|id| self.subject_flag(id)).unwrap_or("ERR1").to_string(),
            Endpoint::IsExistBatch => {
                let flags: Vec<&str> = ids.iter().map(|id| self.subject_flag(id)).collect();
                json!(flags).to_string()
            }
            Endpoint::BlockBv => {
                let (result, mid) = ids.first().map(|id| self.content_answer(id)).unwrap_or(("None", None));
                json!({ "msg": "OK", "mid": mid, "result": result }).to_string()
            }
            Endpoint::BlockedBvBatch => {
                let (results, mids): (Vec<&str>, Vec<Option<u64>>) =
                    ids.iter().map(|id| self.content_answer(id)).unzip();
                json!({ "msg": "OK", "mid": mids, "result": results }).to_string()
            }
            Endpoint::Block | Endpoint::Remove | Endpoint::Alive => "OK".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Transport for VerdictTransport {
    async fn send(&self, request: &ServiceRequest) -> Result<String, ServiceError> {
        Ok(self.answer(request))
    }
}

/// Outcome of a replay run.
#[derive(Debug)]
struct ReplaySummary {
    hidden: Vec<String>,
    notices: Vec<String>,
    cache_size: usize,
}

async fn run_cycles<T: Transport + 'static>(
    engine: FilterEngine<bb_core::memory::MemoryEntry>,
    host: MemoryHost,
    transport: T,
    cycles: u32,
) -> ReplaySummary {
    let mut scheduler = Scheduler::new(engine, host, Arc::new(transport));
    for cycle in 1..=cycles {
        let report = scheduler.cycle().await;
        log::info!(
            "cycle {}: {} entries, {} skipped, {} hidden from cache, {} queried",
            cycle,
            report.extracted,
            report.skipped,
            report.hidden,
            report.queued
        );
    }

    let cache_size = scheduler.engine().cache().len();
    let host = scheduler.into_host();
    ReplaySummary {
        hidden: host.hidden_labels().into_iter().map(str::to_string).collect(),
        notices: host.notices().iter().map(|n| n.message().to_string()).collect(),
        cache_size,
    }
}

pub fn cmd_replay(
    config: &EngineConfig,
    timeout: Duration,
    fixture: &str,
    url: &str,
    cycles: u32,
    verdicts: Option<&str>,
) -> Result<(), String> {
    if cycles == 0 {
        return Err("--cycles must be at least 1".to_string());
    }
    let text = fs::read_to_string(fixture).map_err(|e| format!("Failed to read {}: {}", fixture, e))?;
    let page: FixturePage = serde_json::from_str(&text).map_err(|e| format!("Invalid fixture {}: {}", fixture, e))?;
    let total = page.entries.len();

    let engine = FilterEngine::for_url(url, config.clone()).ok_or_else(|| format!("Page is not filtered: {}", url))?;
    let host = MemoryHost::new(page);

    let runtime =
        tokio::runtime::Runtime::new().map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    let summary = match verdicts {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
            let transport = VerdictTransport::from_json(&text).map_err(|e| format!("Invalid verdicts {}: {}", path, e))?;
            runtime.block_on(run_cycles(engine, host, transport, cycles))
        }
        None => {
            let transport = HttpTransport::new(&config.server_url, timeout).map_err(|e| e.to_string())?;
            runtime.block_on(run_cycles(engine, host, transport, cycles))
        }
    };

    println!("Replayed {} cycle(s) over {} entries", cycles, total);
    println!("  Cached verdicts: {}", summary.cache_size);
    println!("  Hidden: {}", summary.hidden.len());
    for label in &summary.hidden {
        println!("    {}", label);
    }
    for notice in &summary.notices {
        println!("  Notice: {}", notice);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bb_core::memory::FixtureEntry;
    use bb_core::strategy::{HomeFeed, PopularFeed};
    use bb_core::wire::lookup_request;
    use bb_core::{IdKind, LookupShape};

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_verdict_transport_answers() {
        let transport = VerdictTransport::from_json(
            r#"{"1": "True", "BV1": {"result": "True", "mid": 9}, "BV2": {"result": "False", "mid": 8}}"#,
        )
        .unwrap();

        let batch = lookup_request(IdKind::Subject, LookupShape::Batched, &ids(&["1", "2"]));
        assert_eq!(transport.answer(&batch), r#"["True","False"]"#);

        let content = lookup_request(IdKind::Content, LookupShape::Batched, &ids(&["BV1", "BV3"]));
        let body: serde_json::Value = serde_json::from_str(&transport.answer(&content)).unwrap();
        assert_eq!(body["mid"], json!([9, null]));
        assert_eq!(body["result"], json!(["True", "None"]));
    }

    #[tokio::test]
    async fn test_replay_home_fixture() {
        let card = |label: &str, mid: &str| {
            FixtureEntry::new(label)
                .with_attr(HomeFeed::OWNER_LINK, "href", &format!("//space.bilibili.com/{}", mid))
                .with_text(HomeFeed::AUTHOR, label)
        };
        let host = MemoryHost::from_entries(vec![card("a", "1"), card("b", "2"), FixtureEntry::new("ad")]);
        let engine = FilterEngine::for_url("https://www.bilibili.com/", EngineConfig::default()).unwrap();
        let transport = VerdictTransport::from_json(r#"{"2": "True"}"#).unwrap();

        let summary = run_cycles(engine, host, transport, 2).await;
        assert_eq!(summary.hidden, vec!["b".to_string()]);
        assert_eq!(summary.cache_size, 2);
        assert!(summary.notices.is_empty());
    }

    #[tokio::test]
    async fn test_replay_popular_fixture() {
        let card = FixtureEntry::new("p")
            .with_attr(PopularFeed::VIDEO_LINK, "href", "//www.bilibili.com/video/BV1")
            .with_text(PopularFeed::AUTHOR, "up");
        let host = MemoryHost::from_entries(vec![card]);
        let engine = FilterEngine::for_url("https://www.bilibili.com/v/popular/all/", EngineConfig::default()).unwrap();
        let transport = VerdictTransport::from_json(r#"{"BV1": {"result": "True", "mid": 9}}"#).unwrap();

        let summary = run_cycles(engine, host, transport, 1).await;
        assert_eq!(summary.hidden, vec!["p".to_string()]);
    }
}

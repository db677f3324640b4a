//! WebAssembly bindings for the feed blocker
//!
//! The userscript creates one [`PageSession`] per page and calls `scan()`
//! on its own timer, using `next_delay_ms()` for the delay. Requests go out
//! through the `send` callback given to the constructor; the script answers
//! each one with `complete(batch, body)` or `fail(batch, reason)`. When a
//! block succeeds those return the delay in milliseconds until the extra
//! re-scan, and the script re-arms its timer with it.
//!
//! Every request must be answered. An id stays in flight, and a recovery
//! probe stays outstanding, until its batch is completed or failed, so a
//! `send` that times out has to call `fail`.

mod dom;
mod logger;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use wasm_bindgen::prelude::*;

use bb_core::config::PageTimings;
use bb_core::url::join_endpoint;
use bb_core::{BatchId, Dispatch, EngineConfig, EntryIdentity, FilterEngine, PageHost, ScanReport, ServiceError};

use dom::{DomEntry, DomHost, JsTransport};

pub(crate) struct Session {
    pub(crate) engine: FilterEngine<DomEntry>,
    pub(crate) host: DomHost,
}

#[wasm_bindgen]
pub fn init_logging(level: Option<String>) {
    logger::init(level.as_deref());
}

/// Page kind for a URL, or `undefined` if the page is not filtered.
#[wasm_bindgen]
pub fn page_kind(url: &str) -> Option<String> {
    bb_core::PageKind::from_url(url).map(|kind| kind.as_str().to_string())
}

/// Default configuration as pretty-printed JSON.
#[wasm_bindgen]
pub fn default_config() -> Result<String, JsValue> {
    serde_json::to_string_pretty(&EngineConfig::default())
        .map_err(|e| JsValue::from_str(&format!("Failed to serialize config: {}", e)))
}

pub(crate) fn dispatch_to_js(dispatch: &Dispatch, server_url: &str) -> JsValue {
    let request = &dispatch.request;
    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"batch".into(), &JsValue::from_f64(dispatch.batch as f64));
    let _ = js_sys::Reflect::set(&result, &"method".into(), &JsValue::from_str(request.method().as_str()));
    let _ = js_sys::Reflect::set(&result, &"path".into(), &JsValue::from_str(request.path()));
    let _ = js_sys::Reflect::set(
        &result,
        &"url".into(),
        &JsValue::from_str(&join_endpoint(server_url, request.path())),
    );

    let params = js_sys::Object::new();
    for (key, value) in &request.params {
        let _ = js_sys::Reflect::set(&params, &JsValue::from_str(key), &JsValue::from_str(value));
    }
    let _ = js_sys::Reflect::set(&result, &"params".into(), &params);
    result.into()
}

fn report_to_js(report: &ScanReport) -> JsValue {
    let result = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&result, &"extracted".into(), &JsValue::from(report.extracted as u32));
    let _ = js_sys::Reflect::set(&result, &"skipped".into(), &JsValue::from(report.skipped as u32));
    let _ = js_sys::Reflect::set(&result, &"hidden".into(), &JsValue::from(report.hidden as u32));
    let _ = js_sys::Reflect::set(&result, &"queued".into(), &JsValue::from(report.queued as u32));
    let _ = js_sys::Reflect::set(&result, &"requests".into(), &JsValue::from(report.dispatches.len() as u32));
    result.into()
}

/// Delay until the next scan should run.
fn next_delay(scans: u64, timings: &PageTimings, rescan_at: Option<Duration>, now: Duration) -> Duration {
    if scans == 0 {
        return timings.start_delay();
    }
    let interval = timings.scan_interval();
    match rescan_at {
        Some(at) => at.saturating_sub(now).min(interval),
        None => interval,
    }
}

/// Apply a response and return the wait before a re-scan it scheduled.
fn complete_batch<H: PageHost>(
    engine: &mut FilterEngine<H::Entry>,
    host: &mut H,
    batch: BatchId,
    result: Result<String, ServiceError>,
    now: Duration,
) -> Option<Duration> {
    let before = engine.rescan_at();
    engine.complete(host, batch, result, now);
    match engine.rescan_at() {
        Some(at) if before != Some(at) => Some(at.saturating_sub(now)),
        _ => None,
    }
}

#[wasm_bindgen]
pub struct PageSession {
    inner: Rc<RefCell<Session>>,
    transport: JsTransport,
    timings: PageTimings,
    started_ms: f64,
    scans: u64,
    next_clear: Option<Duration>,
}

#[wasm_bindgen]
impl PageSession {
    /// Start a session for `url`. `config_json` overrides the defaults;
    /// `send(request)` receives every request to deliver.
    #[wasm_bindgen(constructor)]
    pub fn new(url: &str, config_json: Option<String>, send: js_sys::Function) -> Result<PageSession, JsValue> {
        let config = match config_json {
            Some(text) => EngineConfig::from_json(&text).map_err(|e| JsValue::from_str(&e.to_string()))?,
            None => EngineConfig::default(),
        };
        let strategy = bb_core::strategy::for_url(url)
            .ok_or_else(|| JsValue::from_str(&format!("Page is not filtered: {}", url)))?;
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
        let document = window.document().ok_or_else(|| JsValue::from_str("No document"))?;

        let timings = config.timings(strategy.kind()).clone();
        let transport = JsTransport::new(send, config.server_url.clone());
        let notice_ms = config.notice_ms;
        let search_depth = config.context_search_depth;
        let engine = FilterEngine::new(strategy, config);

        let inner = {
            let transport = transport.clone();
            Rc::new_cyclic(move |weak| {
                let host = DomHost::new(window, document, transport, notice_ms, search_depth, weak.clone());
                RefCell::new(Session { engine, host })
            })
        };
        inner.borrow().host.attach()?;
        log::info!("session started for {} page", inner.borrow().engine.kind().as_str());

        Ok(PageSession {
            inner,
            transport,
            next_clear: timings.cache_clear(),
            timings,
            started_ms: js_sys::Date::now(),
            scans: 0,
        })
    }

    fn now(&self) -> Duration {
        let elapsed = (js_sys::Date::now() - self.started_ms).max(0.0);
        Duration::from_millis(elapsed as u64)
    }

    pub fn kind(&self) -> String {
        self.inner.borrow().engine.kind().as_str().to_string()
    }

    /// Run one scan cycle over the live DOM and send its requests.
    /// Returns `{extracted, skipped, hidden, queued, requests}`.
    pub fn scan(&mut self) -> JsValue {
        let now = self.now();
        if let (Some(at), Some(period)) = (self.next_clear, self.timings.cache_clear()) {
            if now >= at {
                self.clear_cache();
                self.next_clear = Some(now + period);
            }
        }

        let report = {
            let mut session = self.inner.borrow_mut();
            let Session { engine, host } = &mut *session;
            engine.take_rescan(now);
            let report = engine.scan(host, now);
            host.sync_toggle();
            report
        };
        self.scans += 1;

        for dispatch in &report.dispatches {
            self.transport.send(dispatch);
        }
        report_to_js(&report)
    }

    /// Feed back the response body for `batch`. Returns the delay in ms
    /// until `scan()` should run again if the response scheduled a re-scan.
    pub fn complete(&mut self, batch: f64, body: String) -> Option<f64> {
        self.finish(batch, Ok(body))
    }

    /// Report that `batch` could not be delivered.
    pub fn fail(&mut self, batch: f64, reason: Option<String>) -> Option<f64> {
        let reason = reason.unwrap_or_else(|| "request failed".to_string());
        self.finish(batch, Err(ServiceError::Transport(reason)))
    }

    fn finish(&mut self, batch: f64, result: Result<String, ServiceError>) -> Option<f64> {
        let now = self.now();
        let mut session = self.inner.borrow_mut();
        let Session { engine, host } = &mut *session;
        complete_batch(engine, host, batch as BatchId, result, now).map(|delay| delay.as_millis() as f64)
    }

    pub fn clear_cache(&mut self) {
        self.inner.borrow_mut().engine.clear_cache();
    }

    /// Milliseconds to wait before the next `scan()`.
    pub fn next_delay_ms(&self) -> f64 {
        let rescan_at = self.inner.borrow().engine.rescan_at();
        next_delay(self.scans, &self.timings, rescan_at, self.now()).as_millis() as f64
    }

    /// Block `mid`. Returns `false` if there was nothing to send.
    pub fn block(&mut self, mid: &str, name: &str) -> bool {
        let dispatch = self
            .inner
            .borrow_mut()
            .engine
            .block(EntryIdentity::new(mid.trim(), name.trim()));
        self.deliver(dispatch)
    }

    /// Unblock `mid`. Returns `false` if there was nothing to send.
    pub fn unblock(&mut self, mid: &str) -> bool {
        let dispatch = self.inner.borrow_mut().engine.unblock(mid.trim());
        self.deliver(dispatch)
    }

    fn deliver(&self, dispatch: Option<Dispatch>) -> bool {
        match dispatch {
            Some(dispatch) => {
                self.transport.send(&dispatch);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_block_reply_returns_rescan_delay() {
        use bb_core::memory::{MemoryEntry, MemoryHost};

        let mut host = MemoryHost::default();
        let mut engine: FilterEngine<MemoryEntry> =
            FilterEngine::for_url("https://www.bilibili.com/v/popular/all/", EngineConfig::default()).unwrap();

        let failed = engine.block(EntryIdentity::new("7", "someone")).unwrap();
        assert_eq!(complete_batch(&mut engine, &mut host, failed.batch, Ok("ERR2".to_string()), ms(0)), None);

        let dispatch = engine.block(EntryIdentity::new("7", "someone")).unwrap();
        let delay = complete_batch(&mut engine, &mut host, dispatch.batch, Ok("OK".to_string()), ms(2_000));
        assert_eq!(delay, Some(ms(100)));
        assert_eq!(next_delay(1, engine.timings(), engine.rescan_at(), ms(2_000)), ms(100));
    }

    #[test]
    fn test_next_delay() {
        let config = EngineConfig::default();
        let popular = &config.pages.popular;
        assert_eq!(next_delay(0, popular, None, ms(0)), ms(1_000));
        assert_eq!(next_delay(1, popular, None, ms(0)), ms(10_000));

        // A pending re-scan pulls the next cycle forward
        assert_eq!(next_delay(3, popular, Some(ms(5_100)), ms(5_000)), ms(100));
        assert_eq!(next_delay(3, popular, Some(ms(5_100)), ms(6_000)), ms(0));
    }
}

//! Live DOM host
//!
//! Implements [`PageHost`] over `web_sys`. Annotations are stored as data
//! attributes on the entry element, so they survive between scans and are
//! visible to the context-menu listener.

use std::cell::RefCell;
use std::rc::Weak;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, EventTarget, HtmlElement, MouseEvent, Window};

use bb_core::strategy::ProfilePage;
use bb_core::{Dispatch, EntryIdentity, EntryView, Notice, PageHost, ToggleState};

use crate::Session;

const ATTR_ID: &str = "data-bb-id";
const ATTR_NAME: &str = "data-bb-name";
const ATTR_BOUND: &str = "data-bb-bound";

const MENU_CLASS: &str = "bb-block-menu";
const TOGGLE_ID: &str = "bb-toggle";

const TOAST_STYLE: &str = "position:fixed;left:50%;top:80px;transform:translateX(-50%);z-index:100000;\
padding:6px 14px;border-radius:4px;background:rgba(0,0,0,0.75);color:#fff;font-size:14px;";
const MENU_STYLE: &str = "position:fixed;z-index:100001;padding:6px 12px;border-radius:4px;\
background:#fff;box-shadow:0 2px 8px rgba(0,0,0,0.25);cursor:pointer;font-size:14px;";
const TOGGLE_STYLE: &str = "float:right;margin-right:10px;padding:0 12px;border:none;border-radius:4px;\
line-height:30px;color:#fff;background:#fb7299;cursor:pointer;";

// =============================================================================
// Entries
// =============================================================================

#[derive(Debug, Clone)]
pub struct DomEntry(Element);

impl EntryView for DomEntry {
    fn attr(&self, selector: &str, name: &str) -> Option<String> {
        self.0.query_selector(selector).ok()??.get_attribute(name)
    }

    fn text(&self, selector: &str) -> Option<String> {
        let element = self.0.query_selector(selector).ok()??;
        Some(element_text(&element))
    }
}

fn element_text(element: &Element) -> String {
    match element.dyn_ref::<HtmlElement>() {
        Some(html) => html.inner_text(),
        None => element.text_content().unwrap_or_default(),
    }
}

fn read_annotation(element: &Element) -> Option<EntryIdentity> {
    let id = element.get_attribute(ATTR_ID)?;
    let name = element.get_attribute(ATTR_NAME)?;
    Some(EntryIdentity::new(id, name))
}

/// Annotations of the event target and its ancestors, nearest first, at
/// most `depth` nodes.
pub(crate) fn ancestor_annotations(target: Option<EventTarget>, depth: usize) -> Vec<Option<EntryIdentity>> {
    let mut found = Vec::new();
    let mut node = target.and_then(|t| t.dyn_into::<Element>().ok());
    while let Some(element) = node {
        if found.len() >= depth {
            break;
        }
        found.push(read_annotation(&element));
        node = element.parent_element();
    }
    found
}

fn remove_all(document: &Document, selector: &str) {
    if let Ok(list) = document.query_selector_all(selector) {
        for i in 0..list.length() {
            if let Some(element) = list.get(i).and_then(|n| n.dyn_into::<Element>().ok()) {
                element.remove();
            }
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Hands requests to the userscript's `send(request)` callback. The callback
/// must answer asynchronously through `PageSession.complete` / `fail`.
#[derive(Clone)]
pub(crate) struct JsTransport {
    send: js_sys::Function,
    server_url: String,
}

impl JsTransport {
    pub(crate) fn new(send: js_sys::Function, server_url: String) -> Self {
        Self { send, server_url }
    }

    pub(crate) fn send(&self, dispatch: &Dispatch) {
        let request = crate::dispatch_to_js(dispatch, &self.server_url);
        if let Err(e) = self.send.call1(&JsValue::NULL, &request) {
            log::error!("send callback threw for batch {}: {:?}", dispatch.batch, e);
        }
    }
}

/// Run `f` against the live session, then deliver what it dispatched.
///
/// Requests are sent after the session borrow is released so a callback
/// that completes synchronously cannot re-enter a borrowed session.
fn with_session<F>(session: &Weak<RefCell<Session>>, transport: &JsTransport, f: F)
where
    F: FnOnce(&mut Session) -> Option<Dispatch>,
{
    let Some(session) = session.upgrade() else {
        return;
    };
    let dispatch = match session.try_borrow_mut() {
        Ok(mut session) => f(&mut session),
        Err(_) => {
            log::warn!("session busy, event dropped");
            None
        }
    };
    if let Some(dispatch) = dispatch {
        transport.send(&dispatch);
    }
}

// =============================================================================
// Host
// =============================================================================

pub struct DomHost {
    window: Window,
    document: Document,
    transport: JsTransport,
    session: Weak<RefCell<Session>>,
    notice_ms: i32,
    context_listener: Closure<dyn FnMut(MouseEvent)>,
    dismiss_listener: Closure<dyn FnMut()>,
    menu_listener: Option<Closure<dyn FnMut()>>,
    toggle_listener: Option<Closure<dyn FnMut()>>,
    toggle_button: Option<HtmlElement>,
    toggle_state: ToggleState,
}

impl DomHost {
    pub(crate) fn new(
        window: Window,
        document: Document,
        transport: JsTransport,
        notice_ms: u64,
        search_depth: usize,
        session: Weak<RefCell<Session>>,
    ) -> Self {
        let context_listener = {
            let session = session.clone();
            let transport = transport.clone();
            Closure::wrap(Box::new(move |event: MouseEvent| {
                event.prevent_default();
                let click = bb_core::ContextClick {
                    x: event.client_x(),
                    y: event.client_y(),
                    ancestors: ancestor_annotations(event.target(), search_depth),
                };
                with_session(&session, &transport, |s| {
                    let Session { engine, host } = s;
                    engine.context_menu(host, &click);
                    None
                });
            }) as Box<dyn FnMut(MouseEvent)>)
        };

        let dismiss_listener = {
            let document = document.clone();
            Closure::wrap(Box::new(move || remove_all(&document, &format!(".{}", MENU_CLASS))) as Box<dyn FnMut()>)
        };

        Self {
            window,
            document,
            transport,
            session,
            notice_ms: notice_ms.min(i32::MAX as u64) as i32,
            context_listener,
            dismiss_listener,
            menu_listener: None,
            toggle_listener: None,
            toggle_button: None,
            toggle_state: ToggleState::Hidden,
        }
    }

    /// Bind the page-wide listeners. Called once after construction.
    pub(crate) fn attach(&self) -> Result<(), JsValue> {
        self.window
            .add_event_listener_with_callback("click", self.dismiss_listener.as_ref().unchecked_ref())
    }

    /// Create or update the toggle button. The anchor may render late, so
    /// this runs on every scan until the button exists.
    pub(crate) fn sync_toggle(&mut self) {
        if self.toggle_button.is_none() {
            if self.toggle_state == ToggleState::Hidden {
                return;
            }
            let anchor = match self.document.query_selector(ProfilePage::TOGGLE_ANCHOR) {
                Ok(Some(anchor)) => anchor,
                _ => return,
            };
            let button = match self
                .document
                .create_element("button")
                .ok()
                .and_then(|b| b.dyn_into::<HtmlElement>().ok())
            {
                Some(button) => button,
                None => return,
            };
            button.set_id(TOGGLE_ID);
            let _ = button.set_attribute("style", TOGGLE_STYLE);

            let session = self.session.clone();
            let transport = self.transport.clone();
            let listener = Closure::wrap(Box::new(move || {
                with_session(&session, &transport, |s| {
                    let Session { engine, host } = s;
                    engine.toggle_click(&*host)
                });
            }) as Box<dyn FnMut()>);
            let _ = button.add_event_listener_with_callback("click", listener.as_ref().unchecked_ref());
            let _ = anchor.append_child(&button);

            self.toggle_listener = Some(listener);
            self.toggle_button = Some(button);
        }

        if let Some(button) = &self.toggle_button {
            let (label, display) = match self.toggle_state {
                ToggleState::Hidden => ("", "none"),
                ToggleState::Blocked => ("unblock user", "inline-block"),
                ToggleState::NotBlocked => ("block user", "inline-block"),
            };
            button.set_inner_text(label);
            let _ = button.style().set_property("display", display);
        }
    }
}

impl PageHost for DomHost {
    type Entry = DomEntry;

    fn entries(&self, selector: &str) -> Vec<DomEntry> {
        let list = match self.document.query_selector_all(selector) {
            Ok(list) => list,
            Err(e) => {
                log::warn!("bad selector {}: {:?}", selector, e);
                return Vec::new();
            }
        };
        (0..list.length())
            .filter_map(|i| list.get(i))
            .filter_map(|node| node.dyn_into::<Element>().ok())
            .map(DomEntry)
            .collect()
    }

    fn page_text(&self, selector: &str) -> Option<String> {
        let element = self.document.query_selector(selector).ok()??;
        Some(element_text(&element))
    }

    fn hide(&mut self, entry: &DomEntry) {
        if let Some(html) = entry.0.dyn_ref::<HtmlElement>() {
            let _ = html.style().set_property("display", "none");
        }
    }

    fn annotation(&self, entry: &DomEntry) -> Option<EntryIdentity> {
        read_annotation(&entry.0)
    }

    fn annotate(&mut self, entry: &DomEntry, identity: &EntryIdentity) {
        let element = &entry.0;
        let _ = element.set_attribute(ATTR_ID, &identity.id);
        let _ = element.set_attribute(ATTR_NAME, &identity.name);
        if element.has_attribute(ATTR_BOUND) {
            return;
        }
        let bound = element
            .add_event_listener_with_callback("contextmenu", self.context_listener.as_ref().unchecked_ref());
        if bound.is_ok() {
            let _ = element.set_attribute(ATTR_BOUND, "");
        }
    }

    fn notify(&mut self, notice: Notice) {
        log::info!("notice: {}", notice.message());
        let body = match self.document.body() {
            Some(body) => body,
            None => return,
        };
        let toast = match self.document.create_element("div") {
            Ok(toast) => toast,
            Err(_) => return,
        };
        let _ = toast.set_attribute("class", "bb-toast");
        let _ = toast.set_attribute("style", TOAST_STYLE);
        toast.set_text_content(Some(&format!("feed blocker: {}", notice.message())));
        let _ = body.append_child(&toast);

        let remove = Closure::once_into_js(move || toast.remove());
        let _ = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(remove.unchecked_ref(), self.notice_ms);
    }

    fn show_block_menu(&mut self, x: i32, y: i32, target: &EntryIdentity) {
        remove_all(&self.document, &format!(".{}", MENU_CLASS));
        let (body, menu) = match (self.document.body(), self.document.create_element("div")) {
            (Some(body), Ok(menu)) => (body, menu),
            _ => return,
        };
        let _ = menu.set_attribute("class", MENU_CLASS);
        let _ = menu.set_attribute("style", &format!("{}left:{}px;top:{}px;", MENU_STYLE, x, y));
        menu.set_text_content(Some("block user"));

        let session = self.session.clone();
        let transport = self.transport.clone();
        let target = target.clone();
        let listener = Closure::wrap(Box::new(move || {
            let target = target.clone();
            with_session(&session, &transport, move |s| s.engine.block(target));
        }) as Box<dyn FnMut()>);
        let _ = menu.add_event_listener_with_callback("click", listener.as_ref().unchecked_ref());
        let _ = body.append_child(&menu);

        // The previous menu element is gone, so its listener can be dropped.
        self.menu_listener = Some(listener);
    }

    fn render_toggle(&mut self, state: ToggleState) {
        self.toggle_state = state;
        self.sync_toggle();
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use std::rc::Rc;

    use wasm_bindgen_test::*;

    use bb_core::{EngineConfig, FilterEngine};

    use super::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn session(window: Window, document: Document) -> Rc<RefCell<Session>> {
        let config = EngineConfig::default();
        let transport = JsTransport::new(js_sys::Function::new_no_args(""), config.server_url.clone());
        let engine = FilterEngine::for_url("https://www.bilibili.com/", config).unwrap();
        Rc::new_cyclic(move |weak| {
            let host = DomHost::new(window, document, transport, 3_000, 10, weak.clone());
            RefCell::new(Session { engine, host })
        })
    }

    fn count(document: &Document, selector: &str) -> u32 {
        document.query_selector_all(selector).unwrap().length()
    }

    fn right_click(element: &Element) {
        let event = MouseEvent::new("contextmenu").unwrap();
        element.dispatch_event(&event).unwrap();
    }

    #[wasm_bindgen_test]
    fn test_annotate_binds_one_listener() {
        let window = web_sys::window().unwrap();
        let document = window.document().unwrap();
        let element = document.create_element("div").unwrap();
        document.body().unwrap().append_child(&element).unwrap();
        let session = session(window, document.clone());

        {
            let mut session = session.borrow_mut();
            let entry = DomEntry(element.clone());
            session.host.annotate(&entry, &EntryIdentity::new("1", "first"));
            session.host.annotate(&entry, &EntryIdentity::new("1", "first"));
            session.host.annotate(&entry, &EntryIdentity::new("2", "second"));
            assert_eq!(session.host.annotation(&entry), Some(EntryIdentity::new("2", "second")));
        }

        right_click(&element);
        assert_eq!(count(&document, &format!(".{}", MENU_CLASS)), 1);

        // Toasts are not replaced, so each listener call would add one
        element.remove_attribute(ATTR_ID).unwrap();
        right_click(&element);
        assert_eq!(count(&document, ".bb-toast"), 1);

        element.remove();
        remove_all(&document, &format!(".{}", MENU_CLASS));
        remove_all(&document, ".bb-toast");
    }
}

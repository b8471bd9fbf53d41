//! Status events delivered to the host runtime.
//!
//! The host receives each event as a `code` and a `level` string. The code is
//! `"<category>;<kind>;<id>"`; the level carries the optional detail. Rendered
//! together (see the `Display` impl) an event reads
//! `"<category>;<kind>;<id>[;<detail>]"`.

use std::fmt;

/// Event source, the first field of every status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    WebSocket,
    UrlLoader,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::WebSocket => "web-socket",
            Category::UrlLoader => "url-loader",
        }
    }
}

/// Notifications about a WebSocket session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebSocketEvent {
    /// Handshake completed. `headers` is the transport's encoded response headers.
    Connected { headers: String },
    /// A frame is waiting in the session inbox.
    NextMessage,
    Disconnected {
        code: i32,
        reason: String,
        /// HTTP status of a failed handshake, 0 when not applicable.
        response_code: i32,
        headers: String,
    },
}

impl WebSocketEvent {
    fn kind(&self) -> &'static str {
        match self {
            WebSocketEvent::Connected { .. } => "connected",
            WebSocketEvent::NextMessage => "nextMessage",
            WebSocketEvent::Disconnected { .. } => "disconnected",
        }
    }

    fn detail(&self) -> String {
        match self {
            WebSocketEvent::Connected { headers } => headers.clone(),
            WebSocketEvent::NextMessage => String::new(),
            WebSocketEvent::Disconnected {
                code,
                reason,
                response_code,
                headers,
            } => {
                if *response_code == 0 && headers.is_empty() {
                    format!("{code};{reason}")
                } else {
                    format!("{code};{reason};{response_code};{headers}")
                }
            }
        }
    }
}

/// Notifications about a one-shot URL load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderEvent {
    /// The response is ready for `awesome_utils_get_loader_result`.
    Success,
    /// `message` is `"<bytes read>;<total bytes>"` as reported by the transport.
    Progress { message: String },
    Error { message: String },
}

impl LoaderEvent {
    fn kind(&self) -> &'static str {
        match self {
            LoaderEvent::Success => "success",
            LoaderEvent::Progress { .. } => "progress",
            LoaderEvent::Error { .. } => "error",
        }
    }

    fn detail(&self) -> String {
        match self {
            LoaderEvent::Success => String::new(),
            LoaderEvent::Progress { message } | LoaderEvent::Error { message } => message.clone(),
        }
    }
}

/// One formatted status event, ready for hand-off to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub code: String,
    pub level: String,
}

impl StatusEvent {
    pub fn new(category: Category, kind: &str, id: &str, detail: String) -> Self {
        Self {
            code: format!("{};{kind};{id}", category.as_str()),
            level: detail,
        }
    }

    pub fn web_socket(id: &str, event: &WebSocketEvent) -> Self {
        Self::new(Category::WebSocket, event.kind(), id, event.detail())
    }

    pub fn url_loader(id: &str, event: &LoaderEvent) -> Self {
        Self::new(Category::UrlLoader, event.kind(), id, event.detail())
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.level.is_empty() {
            f.write_str(&self.code)
        } else {
            write!(f, "{};{}", self.code, self.level)
        }
    }
}

//! WebSocket-based live reload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// WebSocket endpoint clients connect to.
pub const RELOAD_PATH: &str = "/__livereload";

/// Path the client script is served from.
pub const SCRIPT_PATH: &str = "/__livereload.js";

/// Messages sent to preview clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload,

    /// Connection established
    Connected,
}

/// Hub for broadcasting reload signals to all connected clients.
///
/// Clients that are not connected when a signal is sent never see it.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    /// Create a new reload hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Tell every connected client to reload. Returns the number of clients reached.
    pub fn notify_reload(&self) -> usize {
        let reached = self.send(ReloadMessage::Reload);
        tracing::debug!("Reload sent to {} clients", reached);
        reached
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) -> usize {
        // No receivers is not an error
        self.sender.send(msg).unwrap_or(0)
    }

    /// Subscribe to reload messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Insert the client script tag before `</body>`, or append it.
pub fn inject_client(html: &str) -> String {
    let tag = format!(r#"<script src="{}"></script>"#, SCRIPT_PATH);

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(pos) => format!("{}{}\n{}", &html[..pos], tag, &html[pos..]),
        None => format!("{}\n{}", html, tag),
    }
}

/// Generate the client-side live reload script.
pub fn client_script() -> String {
    format!(
        r#"
(function() {{
  'use strict';

  const url = (location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '{}';
  let retries = 0;
  const maxRetries = 10;

  function connect() {{
    const ws = new WebSocket(url);

    ws.onopen = function() {{
      if (retries > 0) {{
        // Server came back; pick up whatever was rebuilt meanwhile
        location.reload();
        return;
      }}
      console.log('[kiln] Connected');
    }};

    ws.onmessage = function(event) {{
      const msg = JSON.parse(event.data);

      switch (msg.type) {{
        case 'reload':
          location.reload();
          break;

        case 'connected':
          console.log('[kiln] Live reload active');
          break;
      }}
    }};

    ws.onclose = function() {{
      if (retries < maxRetries) {{
        retries++;
        setTimeout(connect, 1000 * retries);
      }}
    }};
  }}

  connect();
}})();
"#,
        RELOAD_PATH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_broadcasts_reloads() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();

        assert_eq!(hub.notify_reload(), 1);

        match rx.try_recv() {
            Ok(ReloadMessage::Reload) => {}
            _ => panic!("Expected Reload message"),
        }
    }

    #[test]
    fn reload_without_clients_reaches_nobody() {
        let hub = ReloadHub::new();

        assert_eq!(hub.notify_reload(), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn late_subscribers_miss_earlier_reloads() {
        let hub = ReloadHub::new();
        hub.notify_reload();

        let mut rx = hub.subscribe();

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn serializes_messages() {
        let json = serde_json::to_string(&ReloadMessage::Reload).unwrap();

        assert_eq!(json, r#"{"type":"reload"}"#);
    }

    #[test]
    fn injects_before_closing_body() {
        let html = "<html><body><p>Hi</p></BODY></html>";

        let out = inject_client(html);

        assert!(out.contains(r#"<script src="/__livereload.js"></script>"#));
        assert!(out.find("__livereload.js").unwrap() < out.find("</BODY>").unwrap());
    }

    #[test]
    fn appends_without_body() {
        let out = inject_client("<p>fragment</p>");

        assert!(out.starts_with("<p>fragment</p>"));
        assert!(out.ends_with("</script>"));
    }

    #[test]
    fn script_targets_reload_endpoint() {
        assert!(client_script().contains(RELOAD_PATH));
    }
}

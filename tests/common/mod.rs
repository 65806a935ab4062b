//! In-process fake DevTools endpoint.
//!
//! Accepts WebSocket clients, records every request frame and answers them
//! through a script. Tests can also push arbitrary frames to the most
//! recent session.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

/// Maps one request frame to the frames sent back.
pub type Script = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

/// Answers every request with an empty result.
pub fn ok_script() -> Script {
    Arc::new(|request: &Value| vec![json!({ "id": request["id"], "result": {} })])
}

/// Builds a script from a per-method table; unlisted methods get `{}`.
pub fn script(table: impl Fn(&str, &Value) -> Option<Vec<Value>> + Send + Sync + 'static) -> Script {
    Arc::new(move |request: &Value| {
        let method = request["method"].as_str().unwrap_or_default();
        table(method, request)
            .unwrap_or_else(|| vec![json!({ "id": request["id"], "result": {} })])
    })
}

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct FakeEndpoint {
    pub url: String,
    received: Arc<Mutex<Vec<Value>>>,
    push: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
    sessions: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeEndpoint {
    pub async fn start() -> anyhow::Result<Self> {
        Self::with_script(ok_script()).await
    }

    pub async fn with_script(script: Script) -> anyhow::Result<Self> {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("ws://{}/devtools/page/FAKE", listener.local_addr()?);

        let received = Arc::new(Mutex::new(Vec::new()));
        let push = Arc::new(Mutex::new(None));
        let sessions = Arc::new(AtomicUsize::new(0));

        let task = {
            let received = Arc::clone(&received);
            let push = Arc::clone(&push);
            let sessions = Arc::clone(&sessions);

            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        continue;
                    };

                    let (tx, rx) = mpsc::unbounded_channel();
                    *push.lock() = Some(tx);
                    sessions.fetch_add(1, Ordering::SeqCst);

                    tokio::spawn(serve(ws, rx, Arc::clone(&script), Arc::clone(&received)));
                }
            })
        };

        Ok(Self {
            url,
            received,
            push,
            sessions,
            task,
        })
    }

    /// Request frames received so far, across sessions.
    pub fn requests(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    /// Method names received so far, in order.
    pub fn methods(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .filter_map(|request| request["method"].as_str().map(str::to_owned))
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.methods().iter().filter(|m| *m == method).count()
    }

    /// First received request with this method.
    pub fn request(&self, method: &str) -> Option<Value> {
        self.received
            .lock()
            .iter()
            .find(|request| request["method"] == method)
            .cloned()
    }

    /// Number of accepted sessions.
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Sends a JSON frame on the latest session.
    pub fn push(&self, frame: Value) {
        self.push_message(Message::Text(frame.to_string().into()));
    }

    /// Sends an event frame on the latest session.
    pub fn push_event(&self, method: &str, params: Value) {
        self.push(json!({ "method": method, "params": params }));
    }

    pub fn push_message(&self, message: Message) {
        if let Some(tx) = self.push.lock().as_ref() {
            let _ = tx.send(message);
        }
    }

    /// Closes the latest session from the server side.
    pub fn disconnect(&self) {
        self.push_message(Message::Close(None));
    }

    /// Polls until `method` was received `expected` times.
    pub async fn wait_for_count(&self, method: &str, expected: usize) -> bool {
        for _ in 0..200 {
            if self.count(method) >= expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl Drop for FakeEndpoint {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    ws: WebSocketStream<TcpStream>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    script: Script,
    received: Arc<Mutex<Vec<Value>>>,
) {
    let (mut sink, mut source) = ws.split();

    loop {
        // Pushed frames go out before the reply to any later request.
        tokio::select! {
            biased;

            message = outgoing.recv() => match message {
                Some(Message::Close(frame)) => {
                    let _ = sink.send(Message::Close(frame)).await;
                    return;
                }
                Some(message) => {
                    if sink.send(message).await.is_err() {
                        return;
                    }
                }
                None => return,
            },

            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Ok(request) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    received.lock().push(request.clone());

                    for reply in script(&request) {
                        if sink.send(Message::Text(reply.to_string().into())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Polls a condition for up to two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

//! End-to-end convergence: clients, server, and the in-memory adapter
//! working together.
//!
//! The harness here plays the role of the transport: it shuttles each
//! client's outbound submissions into `Server::submit` and queues the
//! resulting acks and broadcasts back to every replica in commit order,
//! which is exactly the FIFO guarantee a real transport must provide.

use std::collections::VecDeque;

use openot_core::{
    BackendAdapter, Client, ClientMessage, MemoryAdapter, Operation, Server, ServerMessage,
    TextType,
};
use proptest::prelude::*;
use serde_json::json;
use tokio::sync::mpsc;

struct SimClient {
    client: Client<TextType>,
    outbox: mpsc::UnboundedReceiver<ClientMessage<Operation>>,
    inbound: VecDeque<ServerMessage<Operation, String>>,
}

impl SimClient {
    fn new(snapshot: &str, revision: u64) -> Self {
        let mut client = Client::new(TextType::new(), snapshot.to_string(), revision);
        let (tx, rx) = mpsc::unbounded_channel();
        client.attach_sender(tx);
        Self {
            client,
            outbox: rx,
            inbound: VecDeque::new(),
        }
    }

    fn insert(&mut self, pos: usize, text: &str) {
        let len = self.client.snapshot().chars().count();
        let mut op = Operation::new();
        op.retain(pos);
        op.insert(text);
        op.retain(len - pos);
        self.client.apply_local(op).unwrap();
    }

    fn delete(&mut self, pos: usize, count: usize) {
        let len = self.client.snapshot().chars().count();
        let mut op = Operation::new();
        op.retain(pos);
        op.delete(count);
        op.retain(len - pos - count);
        self.client.apply_local(op).unwrap();
    }
}

async fn text_server() -> Server<MemoryAdapter> {
    text_server_with("").await
}

async fn text_server_with(initial: &str) -> Server<MemoryAdapter> {
    let server = Server::new(MemoryAdapter::new());
    server.register_type(TextType::new()).unwrap();
    server
        .create_document("doc", "text", json!(initial))
        .await
        .unwrap();
    server
}

/// Run submissions and deliveries until every queue is drained
async fn flush(server: &Server<MemoryAdapter>, clients: &mut [SimClient]) {
    loop {
        let mut progressed = false;

        for i in 0..clients.len() {
            loop {
                let msg = match clients[i].outbox.try_recv() {
                    Ok(msg) => msg,
                    Err(_) => break,
                };
                let ClientMessage::Op { op, revision } = msg;
                let commit = server
                    .submit("doc", serde_json::to_value(&op).unwrap(), revision)
                    .await
                    .unwrap();
                let committed: Operation = serde_json::from_value(commit.op).unwrap();

                for (j, other) in clients.iter_mut().enumerate() {
                    if j == i {
                        other.inbound.push_back(ServerMessage::Ack);
                    } else {
                        other.inbound.push_back(ServerMessage::Op {
                            op: committed.clone(),
                            revision: commit.revision,
                        });
                    }
                }
                progressed = true;
            }
        }

        for sim in clients.iter_mut() {
            while let Some(msg) = sim.inbound.pop_front() {
                match msg {
                    ServerMessage::Ack => sim.client.on_server_ack().unwrap(),
                    ServerMessage::Op { op, .. } => sim.client.on_remote(op).unwrap(),
                    _ => {}
                }
                progressed = true;
            }
        }

        if !progressed {
            break;
        }
    }
}

async fn server_text(server: &Server<MemoryAdapter>) -> (String, u64) {
    let (snapshot, revision) = server.current_snapshot("doc").await.unwrap();
    (serde_json::from_value(snapshot).unwrap(), revision)
}

#[tokio::test]
async fn test_concurrent_inserts_at_same_position_converge() {
    let server = text_server().await;
    let mut clients = vec![SimClient::new("", 0), SimClient::new("", 0)];

    clients[0].insert(0, "A");
    clients[1].insert(0, "B");
    flush(&server, &mut clients).await;

    let (text, revision) = server_text(&server).await;
    assert_eq!(revision, 2);
    for sim in &clients {
        assert_eq!(sim.client.snapshot(), &text);
        assert_eq!(sim.client.revision(), 2);
        assert!(sim.client.state().is_synchronized());
    }
}

#[tokio::test]
async fn test_concurrent_prefix_and_suffix_edits_converge() {
    // S5 as a full round trip: one client appends while the other prepends
    let server = text_server_with("Hello").await;
    let mut clients = vec![SimClient::new("Hello", 0), SimClient::new("Hello", 0)];

    clients[0].insert(5, " World");
    clients[1].insert(0, "Big ");
    flush(&server, &mut clients).await;

    let (text, _) = server_text(&server).await;
    assert_eq!(text, "Big Hello World");
    for sim in &clients {
        assert_eq!(sim.client.snapshot(), "Big Hello World");
    }
}

#[tokio::test]
async fn test_buffered_edits_survive_concurrent_remote() {
    let server = text_server().await;
    let mut clients = vec![SimClient::new("", 0), SimClient::new("", 0)];

    // Client 0 types three times without hearing back once
    clients[0].insert(0, "ab");
    clients[0].insert(2, "cd");
    clients[0].insert(4, "ef");
    // Client 1 edits concurrently
    clients[1].insert(0, "XY");
    flush(&server, &mut clients).await;

    let (text, _) = server_text(&server).await;
    assert_eq!(text.len(), 8);
    for sim in &clients {
        assert_eq!(sim.client.snapshot(), &text);
        assert!(sim.client.state().is_synchronized());
    }
}

#[tokio::test]
async fn test_resubmission_after_lost_ack() {
    let server = text_server().await;
    let mut sim = SimClient::new("", 0);

    sim.insert(0, "a");
    let ClientMessage::Op { op, revision } = sim.outbox.try_recv().unwrap();
    server
        .submit("doc", serde_json::to_value(&op).unwrap(), revision)
        .await
        .unwrap();

    // The ack never arrives; the client reconnects and repeats itself
    sim.client.resend_pending();
    let ClientMessage::Op { op, revision } = sim.outbox.try_recv().unwrap();
    let commit = server
        .submit("doc", serde_json::to_value(&op).unwrap(), revision)
        .await
        .unwrap();

    assert_eq!(commit.revision, 1);
    assert_eq!(server.adapter().get_record("doc").await.unwrap().revision, 1);

    sim.client.on_server_ack().unwrap();
    assert_eq!(sim.client.revision(), 1);
    assert!(sim.client.state().is_synchronized());
}

#[tokio::test]
async fn test_observer_follows_through_fanout_channel() {
    let server = text_server().await;
    let mut editor = SimClient::new("", 0);
    let mut observer = Client::new(TextType::new(), String::new(), 0);
    let mut updates = server.adapter().subscribe("doc").await.unwrap();

    editor.insert(0, "Hello");
    editor.insert(5, "!");
    loop {
        let msg = match editor.outbox.try_recv() {
            Ok(msg) => msg,
            Err(_) => break,
        };
        let ClientMessage::Op { op, revision } = msg;
        let commit = server
            .submit("doc", serde_json::to_value(&op).unwrap(), revision)
            .await
            .unwrap();
        editor.client.on_server_ack().unwrap();

        // Broadcasting the commit is the caller's job
        let broadcast: ServerMessage<Operation, String> = ServerMessage::Op {
            op: serde_json::from_value(commit.op).unwrap(),
            revision: commit.revision,
        };
        server
            .adapter()
            .publish("doc", openot_core::protocol::encode(&broadcast).unwrap())
            .await
            .unwrap();
    }

    while let Ok(frame) = updates.try_recv() {
        let msg: ServerMessage<Operation, String> =
            openot_core::protocol::decode(&frame).unwrap();
        if let ServerMessage::Op { op, .. } = msg {
            observer.on_remote(op).unwrap();
        }
    }

    assert_eq!(observer.snapshot(), "Hello!");
    assert_eq!(observer.revision(), 2);
}

#[tokio::test]
async fn test_concurrent_overlapping_deletes_converge() {
    let server = text_server_with("abcdef").await;
    let mut clients = vec![SimClient::new("abcdef", 0), SimClient::new("abcdef", 0)];

    clients[0].delete(1, 2); // "adef"
    clients[1].delete(2, 3); // "abf"
    flush(&server, &mut clients).await;

    let (text, _) = server_text(&server).await;
    assert_eq!(text, "af");
    for sim in &clients {
        assert_eq!(sim.client.snapshot(), "af");
        assert!(sim.client.state().is_synchronized());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any interleaving of edits and deliveries converges: every client
    /// ends on the server's linearization.
    ///
    /// The two clients type from disjoint alphabets. The wire carries no
    /// operation identity, so the server's resubmission detection works by
    /// equality; two clients independently authoring byte-identical ops
    /// against the same revision would be indistinguishable from a resend.
    #[test]
    fn prop_random_concurrent_editing_converges(
        actions in prop::collection::vec(
            (0..2usize, 0..32usize, "[a-m]{1,3}", "[n-z]{1,3}"),
            1..40,
        )
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(async {
            let server = text_server().await;
            let mut clients = vec![SimClient::new("", 0), SimClient::new("", 0)];

            for (idx, (who, pos_seed, low_text, high_text)) in actions.iter().enumerate() {
                let text = if *who == 0 { low_text } else { high_text };
                let sim = &mut clients[*who];
                let len = sim.client.snapshot().chars().count();
                sim.insert(pos_seed % (len + 1), text);

                // Occasionally let the network run mid-session
                if idx % 3 == 0 {
                    flush(&server, &mut clients).await;
                }
            }
            flush(&server, &mut clients).await;

            let (text, revision) = server_text(&server).await;
            for sim in &clients {
                assert_eq!(sim.client.snapshot(), &text);
                assert_eq!(sim.client.revision(), revision);
                assert!(sim.client.state().is_synchronized());
            }
        });
    }
}

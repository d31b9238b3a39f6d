//! End-to-end engine tests against a scripted IMAP peer.
//!
//! The engine runs over an in-memory duplex stream; the peer answers the
//! same tagged-command grammar a real server would, with canned mailbox
//! content. The store is a temp-file SQLite database.

use std::sync::{Arc, Mutex};

use mailsync_rs::config::SyncSettings;
use mailsync_rs::error::SyncError;
use mailsync_rs::imap::ImapSession;
use mailsync_rs::storage::{Account, MessageStore};
use mailsync_rs::sync::{SyncEngine, SyncOptions};
use sqlx::Row;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

#[derive(Clone)]
struct MockMessage {
    uid: u32,
    size: u64,
    header: String,
}

/// A scripted IMAP server for one connection.
#[derive(Clone)]
struct MockServer {
    greeting: String,
    reject_auth: bool,
    folders: Vec<(String, Vec<MockMessage>)>,
    fail_select: Vec<String>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    fn new(folders: Vec<(String, Vec<MockMessage>)>) -> Self {
        Self {
            greeting: "* OK IMAP4rev1 Service Ready\r\n".to_string(),
            reject_auth: false,
            folders,
            fail_select: Vec::new(),
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn spawn(self, stream: DuplexStream) -> JoinHandle<()> {
        tokio::spawn(self.serve(stream))
    }

    async fn serve(self, mut stream: DuplexStream) {
        let _ = stream.write_all(self.greeting.as_bytes()).await;

        let mut buf = Vec::new();
        let mut selected: Option<usize> = None;

        while let Some(line) = read_line(&mut stream, &mut buf).await {
            self.commands.lock().unwrap().push(line.clone());

            let mut parts = line.splitn(3, ' ');
            let tag = parts.next().unwrap_or("").to_string();
            let verb = parts.next().unwrap_or("").to_ascii_uppercase();
            let rest = parts.next().unwrap_or("").to_string();

            let response = match verb.as_str() {
                "CAPABILITY" => format!(
                    "* CAPABILITY IMAP4rev1 AUTH=PLAIN AUTH=LOGIN\r\n{} OK CAPABILITY completed\r\n",
                    tag
                ),
                "AUTHENTICATE" => {
                    if self.reject_auth {
                        format!("{} NO AUTHENTICATE failed\r\n", tag)
                    } else {
                        format!("{} OK AUTHENTICATE completed\r\n", tag)
                    }
                }
                "LOGIN" => {
                    if self.reject_auth {
                        format!("{} NO LOGIN failed\r\n", tag)
                    } else {
                        format!("{} OK LOGIN completed\r\n", tag)
                    }
                }
                "LIST" => {
                    let mut out = String::new();
                    for (name, _) in &self.folders {
                        out.push_str(&format!(
                            "* LIST (\\HasNoChildren) \"/\" \"{}\"\r\n",
                            name
                        ));
                    }
                    out.push_str(&format!("{} OK LIST completed\r\n", tag));
                    out
                }
                "SELECT" => {
                    let name = rest.trim().trim_matches('"').to_string();
                    if self.fail_select.contains(&name) {
                        selected = None;
                        format!("{} NO SELECT failed\r\n", tag)
                    } else if let Some(idx) =
                        self.folders.iter().position(|(n, _)| *n == name)
                    {
                        selected = Some(idx);
                        format!(
                            "* {} EXISTS\r\n* OK [UIDVALIDITY 1] UIDs valid\r\n{} OK [READ-WRITE] SELECT completed\r\n",
                            self.folders[idx].1.len(),
                            tag
                        )
                    } else {
                        selected = None;
                        format!("{} NO SELECT failed\r\n", tag)
                    }
                }
                "SEARCH" => {
                    let seqs = selected
                        .map(|idx| {
                            (1..=self.folders[idx].1.len())
                                .map(|n| n.to_string())
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .unwrap_or_default();
                    format!("* SEARCH {}\r\n{} OK SEARCH completed\r\n", seqs, tag)
                }
                "FETCH" => {
                    let mut out = String::new();
                    if let Some(idx) = selected {
                        for (i, msg) in self.folders[idx].1.iter().enumerate() {
                            out.push_str(&format!(
                                "* {} FETCH (UID {} RFC822.SIZE {} RFC822.HEADER {{{}}}\r\n{})\r\n",
                                i + 1,
                                msg.uid,
                                msg.size,
                                msg.header.len(),
                                msg.header
                            ));
                        }
                    }
                    out.push_str(&format!("{} OK FETCH completed\r\n", tag));
                    out
                }
                "LOGOUT" => {
                    let _ = stream
                        .write_all(
                            format!("* BYE\r\n{} OK LOGOUT completed\r\n", tag).as_bytes(),
                        )
                        .await;
                    break;
                }
                _ => format!("{} BAD unknown command\r\n", tag),
            };

            if stream.write_all(response.as_bytes()).await.is_err() {
                break;
            }
        }
    }
}

async fn read_line(stream: &mut DuplexStream, buf: &mut Vec<u8>) -> Option<String> {
    loop {
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buf.drain(..=pos).collect();
            return Some(String::from_utf8_lossy(&line).trim().to_string());
        }
        let mut chunk = [0u8; 1024];
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

async fn temp_store() -> (MessageStore, tempfile::NamedTempFile) {
    let file = tempfile::NamedTempFile::new().unwrap();
    let url = format!("sqlite://{}?mode=rwc", file.path().display());
    (MessageStore::new(&url).await.unwrap(), file)
}

async fn seeded_account(store: &MessageStore) -> Account {
    let id = store
        .add_account("imap.example.com", 993, "sales@crm.example", "secret123")
        .await
        .unwrap();
    store.account(id).await.unwrap().unwrap()
}

fn inbox_messages() -> Vec<MockMessage> {
    vec![
        MockMessage {
            uid: 101,
            size: 2400,
            header: "From: =?UTF-8?B?0JjQstCw0L0=?= <ivan@example.com>\r\n\
                     To: sales@crm.example\r\n\
                     Subject: =?windows-1251?B?z/Do4uXy?=\r\n\
                     Date: Fri, 5 Jan 2024 10:52:37 +0200\r\n\r\n"
                .to_string(),
        },
        MockMessage {
            uid: 102,
            size: 1800,
            header: "From: anna@elsewhere.example\r\n\
                     To: sales@crm.example\r\n\
                     Subject: =?UTF-8?Q?quarterly?= =?UTF-8?Q?_report?=\r\n\
                     Date: Sat, 6 Jan 2024 09:10:00 +0000\r\n\r\n"
                .to_string(),
        },
    ]
}

fn sent_messages() -> Vec<MockMessage> {
    vec![MockMessage {
        uid: 7,
        size: 900,
        header: "From: sales@crm.example\r\n\
                 To: Ivan <ivan@example.com>\r\n\
                 Subject: offer\r\n\
                 Date: Thu, 4 Jan 2024 15:00:00 +0000\r\n\r\n"
            .to_string(),
    }]
}

fn default_folders() -> Vec<(String, Vec<MockMessage>)> {
    vec![
        ("INBOX".to_string(), inbox_messages()),
        ("Drafts".to_string(), vec![]),
        ("Отправленные".to_string(), sent_messages()),
    ]
}

/// Run the engine once against a fresh scripted connection.
async fn run_once(
    engine: &SyncEngine,
    account: &Account,
    server: MockServer,
    options: SyncOptions,
) -> Result<mailsync_rs::SyncReport, SyncError> {
    let (client, peer) = tokio::io::duplex(1 << 16);
    let handle = server.spawn(peer);

    let mut session = ImapSession::new(client);
    let result = engine.run(&mut session, account, &options).await;

    drop(session);
    let _ = handle.await;
    result
}

#[tokio::test]
async fn test_full_run_inserts_decodes_and_correlates() {
    let (store, _db) = temp_store().await;
    let account = seeded_account(&store).await;
    let ivan = store.add_contact("Ivan", "Ivan@Example.com").await.unwrap();

    let engine = SyncEngine::new(store.clone(), SyncSettings::default());
    let report = run_once(
        &engine,
        &account,
        MockServer::new(default_folders()),
        SyncOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.inserted, 3);
    assert_eq!(report.folders_synced, vec!["INBOX", "Отправленные"]);
    assert!(report.warnings.is_empty());

    // Observed totals come from EXISTS, including the inbox and sent counts.
    let inbox_total = report
        .folder_totals
        .iter()
        .find(|s| s.folder == "INBOX")
        .unwrap();
    assert_eq!(inbox_total.observed, 2);

    // Charset-decoded subject and contact correlation on the first message.
    let row = sqlx::query(
        "SELECT subject, from_addr, contact_id, direction, folder FROM messages WHERE external_key = 'inbox:101'",
    )
    .fetch_one(&*store.db)
    .await
    .unwrap();
    assert_eq!(row.get::<String, _>("subject"), "Привет");
    assert_eq!(row.get::<String, _>("from_addr"), "ivan@example.com");
    assert_eq!(row.get::<Option<i64>, _>("contact_id"), Some(ivan));
    assert_eq!(row.get::<String, _>("direction"), "inbound");
    assert_eq!(row.get::<String, _>("folder"), "inbox");

    // Adjacent encoded-words joined without the separating space.
    let row = sqlx::query("SELECT subject FROM messages WHERE external_key = 'inbox:102'")
        .fetch_one(&*store.db)
        .await
        .unwrap();
    assert_eq!(row.get::<String, _>("subject"), "quarterly report");

    // The sent folder correlates on the To address.
    let row = sqlx::query(
        "SELECT direction, contact_id FROM messages WHERE external_key = 'sent:7'",
    )
    .fetch_one(&*store.db)
    .await
    .unwrap();
    assert_eq!(row.get::<String, _>("direction"), "outbound");
    assert_eq!(row.get::<Option<i64>, _>("contact_id"), Some(ivan));
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let (store, _db) = temp_store().await;
    let account = seeded_account(&store).await;

    let engine = SyncEngine::new(store.clone(), SyncSettings::default());
    let first = run_once(
        &engine,
        &account,
        MockServer::new(default_folders()),
        SyncOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(first.inserted, 3);

    // Same mailbox again on a fresh connection: nothing new.
    let second = run_once(
        &engine,
        &account,
        MockServer::new(default_folders()),
        SyncOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(store.message_count(account.id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_bad_greeting_aborts_before_capability() {
    let (store, _db) = temp_store().await;
    let account = seeded_account(&store).await;

    let mut server = MockServer::new(default_folders());
    server.greeting = "* BAD gone fishing\r\n".to_string();
    let commands = server.commands.clone();

    let engine = SyncEngine::new(store.clone(), SyncSettings::default());
    let err = run_once(&engine, &account, server, SyncOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Greeting(_)));
    assert!(commands.lock().unwrap().is_empty());
    assert_eq!(store.message_count(account.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_auth_failure_carries_diagnostics_without_secret() {
    let (store, _db) = temp_store().await;
    let account = seeded_account(&store).await;

    let mut server = MockServer::new(default_folders());
    server.reject_auth = true;

    let engine = SyncEngine::new(store.clone(), SyncSettings::default());
    let err = run_once(&engine, &account, server, SyncOptions::default())
        .await
        .unwrap_err();

    match err {
        SyncError::Auth(diag) => {
            assert_eq!(diag.username, "sales@crm.example");
            assert_eq!(diag.host, "imap.example.com");
            assert!(diag.capability.contains("IMAP4rev1"));
            assert!(diag.last_response.contains("NO"));
            assert!(!diag.last_response.contains("secret123"));
        }
        other => panic!("expected auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_select_skips_folder_and_continues() {
    let (store, _db) = temp_store().await;
    let account = seeded_account(&store).await;

    let mut server = MockServer::new(default_folders());
    server.fail_select = vec!["INBOX".to_string()];

    let engine = SyncEngine::new(store.clone(), SyncSettings::default());
    let report = run_once(&engine, &account, server, SyncOptions::default())
        .await
        .unwrap();

    // The inbox was skipped with a warning; the sent folder still synced.
    assert_eq!(report.folders_synced, vec!["Отправленные"]);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.inserted, 1);
}

#[tokio::test]
async fn test_oversized_message_is_excluded() {
    let (store, _db) = temp_store().await;
    let account = seeded_account(&store).await;

    let mut messages = inbox_messages();
    messages[1].size = 6 * 1024 * 1024; // over the 5 MiB cap
    let server = MockServer::new(vec![("INBOX".to_string(), messages)]);

    let engine = SyncEngine::new(store.clone(), SyncSettings::default());
    let report = run_once(&engine, &account, server, SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.inserted, 1);
    let keys = store.existing_keys(account.id).await.unwrap();
    assert!(keys.contains("inbox:101"));
    assert!(!keys.contains("inbox:102"));
}

#[tokio::test]
async fn test_empty_folder_is_skipped_without_search() {
    let (store, _db) = temp_store().await;
    let account = seeded_account(&store).await;

    let server = MockServer::new(vec![("INBOX".to_string(), vec![])]);
    let commands = server.commands.clone();

    let engine = SyncEngine::new(store.clone(), SyncSettings::default());
    let report = run_once(&engine, &account, server, SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.folders_synced, vec!["INBOX"]);
    let seen = commands.lock().unwrap();
    assert!(!seen.iter().any(|c| c.contains("SEARCH")));
    assert!(!seen.iter().any(|c| c.contains("FETCH")));
}

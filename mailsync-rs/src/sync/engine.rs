//! Sync run orchestrator
//!
//! Drives one account through one connection:
//! `Connected -> Greeted -> Authenticated -> {Selected -> Searched ->
//! Fetched}* -> LoggedOut -> Closed`. Connect, greeting, and auth
//! failures abort the run; everything after that degrades per folder or
//! per batch, so one bad folder or malformed message never blocks the
//! rest of the mailbox.

use std::collections::{HashMap, HashSet};

use chrono::{Duration as ChronoDuration, Utc};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::error::{Result, SyncError, SyncWarning};
use crate::imap::parser::CandidateMessage;
use crate::imap::session::ImapSession;
use crate::imap::{auth, fetch, folders, parser, transport, SyncFolder};
use crate::mime::decode_header_value;
use crate::storage::{Account, MessageRecord, MessageStore};
use crate::sync::report::SyncReport;
use crate::utils::{extract_email_address, parse_date_header};

/// Per-invocation flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Use the full lookback window for every folder.
    pub full_resync: bool,
    /// Suppress user-visible output upstream; the engine itself only logs.
    pub silent: bool,
}

/// The synchronization engine: one store, one settings set, one account
/// per call. No cross-account shared state.
pub struct SyncEngine {
    store: MessageStore,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(store: MessageStore, settings: SyncSettings) -> Self {
        Self { store, settings }
    }

    /// Synchronize one account over a fresh TLS connection.
    ///
    /// The socket is always released: LOGOUT best-effort, then close, on
    /// every exit path. The last-sync timestamp is updated only when the
    /// run reaches completion.
    pub async fn sync_account(&self, account_id: i64, options: &SyncOptions) -> Result<SyncReport> {
        let account = self
            .store
            .account(account_id)
            .await?
            .ok_or(SyncError::AccountNotFound(account_id))?;

        info!(
            "Starting sync for account {} ({}@{})",
            account.id, account.username, account.host
        );

        let stream =
            transport::connect(&account.host, account.port, self.settings.connect_timeout())
                .await?;
        let mut session = ImapSession::new(stream);

        let outcome = self.run(&mut session, &account, options).await;

        session.logout(self.settings.command_timeout()).await;
        session.close().await;

        let report = outcome?;
        self.store.update_last_sync(account.id, Utc::now()).await?;

        info!(
            "Sync complete for account {}: {} new messages, {} folders, {} warnings",
            account.id,
            report.inserted,
            report.folders_synced.len(),
            report.warnings.len()
        );
        Ok(report)
    }

    /// The protocol part of a run, over an already-open stream. Public so
    /// tests can drive it against an in-memory transport.
    pub async fn run<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        session: &mut ImapSession<S>,
        account: &Account,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        let timeout = self.settings.command_timeout();
        let mut report = SyncReport::default();

        auth::authenticate(session, account, timeout).await?;

        let mut existing = self.store.existing_keys(account.id).await?;
        let contacts = self.store.contact_email_index().await?;
        debug!(
            "Loaded {} existing keys, {} contact addresses",
            existing.len(),
            contacts.len()
        );

        let list_reply = match session.send_command("LIST \"\" \"*\"", timeout).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("LIST failed: {}", e);
                report.warnings.push(SyncWarning::Folder {
                    folder: "*".to_string(),
                    detail: e.to_string(),
                });
                return Ok(report);
            }
        };

        for folder in folders::discover(&list_reply.body) {
            match self
                .sync_folder(
                    session,
                    account,
                    &folder,
                    options,
                    &mut existing,
                    &contacts,
                    &mut report,
                )
                .await
            {
                Ok(()) => report.folders_synced.push(folder.name.clone()),
                Err(warning) => {
                    warn!("{}", warning);
                    report.warnings.push(warning);
                }
            }
        }

        Ok(report)
    }

    /// Select -> Search -> batched Fetch for one folder. Returns a
    /// warning (never a fatal error) on failure; the caller continues
    /// with the next folder.
    #[allow(clippy::too_many_arguments)]
    async fn sync_folder<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        session: &mut ImapSession<S>,
        account: &Account,
        folder: &SyncFolder,
        options: &SyncOptions,
        existing: &mut HashSet<String>,
        contacts: &HashMap<String, i64>,
        report: &mut SyncReport,
    ) -> std::result::Result<(), SyncWarning> {
        let timeout = self.settings.command_timeout();
        let folder_warning = |detail: String| SyncWarning::Folder {
            folder: folder.name.clone(),
            detail,
        };

        let select = session
            .send_command(
                &format!("SELECT \"{}\"", auth::escape_imap_string(&folder.name)),
                timeout,
            )
            .await
            .map_err(|e| folder_warning(e.to_string()))?;
        if !select.is_ok() {
            return Err(folder_warning(select.line));
        }

        let total = fetch::parse_exists(&select.body);
        report.observe(&folder.name, total);
        if total == 0 {
            debug!("Folder {} is empty, skipping", folder.name);
            return Ok(());
        }

        let lookback_days = self
            .lookback_days(account, folder, options)
            .await
            .map_err(|e| folder_warning(e.to_string()))?;
        let since = fetch::format_imap_date(
            (Utc::now() - ChronoDuration::days(lookback_days)).date_naive(),
        );
        debug!(
            "Folder {}: {} messages, searching since {}",
            folder.name, total, since
        );

        let search = session
            .send_command(&format!("SEARCH SINCE {}", since), timeout)
            .await
            .map_err(|e| folder_warning(e.to_string()))?;
        if !search.is_ok() {
            return Err(folder_warning(search.line));
        }

        let sequence_numbers = fetch::parse_search(&search.body);
        if sequence_numbers.is_empty() {
            return Ok(());
        }

        for batch in sequence_numbers.chunks(self.settings.fetch_batch_size) {
            self.sync_batch(session, account, folder, batch, existing, contacts, report)
                .await;
        }

        Ok(())
    }

    /// One FETCH round trip: parse, decode, dedup, correlate, insert.
    /// Failures are recorded as warnings; later batches still run.
    #[allow(clippy::too_many_arguments)]
    async fn sync_batch<S: AsyncRead + AsyncWrite + Unpin>(
        &self,
        session: &mut ImapSession<S>,
        account: &Account,
        folder: &SyncFolder,
        batch: &[u32],
        existing: &mut HashSet<String>,
        contacts: &HashMap<String, i64>,
        report: &mut SyncReport,
    ) {
        let timeout = self.settings.command_timeout();
        let batch_label = fetch::sequence_set(batch);

        let reply = match session
            .send_command(&fetch::fetch_command(batch), timeout)
            .await
        {
            Ok(reply) if reply.is_ok() => reply,
            Ok(reply) => {
                report.warnings.push(SyncWarning::Fetch {
                    folder: folder.name.clone(),
                    batch: batch_label,
                    detail: reply.line,
                });
                return;
            }
            Err(e) => {
                report.warnings.push(SyncWarning::Fetch {
                    folder: folder.name.clone(),
                    batch: batch_label,
                    detail: e.to_string(),
                });
                return;
            }
        };

        let candidates = parser::parse_fetch_response(&reply.body);
        if candidates.is_empty() {
            report.warnings.push(SyncWarning::Parse {
                folder: folder.name.clone(),
                detail: format!("no parseable messages in batch {}", batch_label),
            });
            return;
        }

        let mut rows = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let key = format!("{}:{}", folder.local.as_str(), candidate.uid);
            if existing.contains(&key) {
                continue;
            }
            if candidate.size > self.settings.max_message_size {
                debug!(
                    "Skipping oversized message {} ({} bytes)",
                    key, candidate.size
                );
                continue;
            }
            rows.push(self.decode_candidate(account, folder, candidate, key, contacts));
        }

        if rows.is_empty() {
            return;
        }

        match self.store.insert_messages(&rows).await {
            Ok(inserted) => {
                for row in &rows {
                    existing.insert(row.external_key.clone());
                }
                report.inserted += inserted;
            }
            Err(e) => {
                report.warnings.push(SyncWarning::Persist {
                    folder: folder.name.clone(),
                    detail: e.to_string(),
                });
            }
        }
    }

    /// Decode one candidate into a row: RFC 2047 headers, address
    /// extraction, Date parsing (current time when missing or
    /// unparsable), contact correlation with From preferred.
    fn decode_candidate(
        &self,
        account: &Account,
        folder: &SyncFolder,
        candidate: &CandidateMessage,
        external_key: String,
        contacts: &HashMap<String, i64>,
    ) -> MessageRecord {
        let header = |name: &str| {
            candidate
                .headers
                .get(name)
                .map(decode_header_value)
                .unwrap_or_default()
        };

        let from_addr = extract_email_address(&header("From"));
        let to_addr = extract_email_address(&header("To"));
        let subject = header("Subject");

        let message_ts = candidate
            .headers
            .get("Date")
            .and_then(parse_date_header)
            .unwrap_or_else(Utc::now);

        let contact_id = contacts
            .get(&from_addr.to_lowercase())
            .or_else(|| contacts.get(&to_addr.to_lowercase()))
            .copied();

        MessageRecord {
            account_id: account.id,
            external_key,
            folder: folder.local.as_str().to_string(),
            direction: folder.direction.as_str().to_string(),
            from_addr,
            to_addr,
            subject,
            contact_id,
            message_ts,
        }
    }

    /// 90 days on a full resync or a never-synced folder, 30 days
    /// incremental.
    async fn lookback_days(
        &self,
        account: &Account,
        folder: &SyncFolder,
        options: &SyncOptions,
    ) -> Result<i64> {
        if options.full_resync {
            return Ok(self.settings.full_lookback_days);
        }
        let has_rows = self
            .store
            .folder_has_rows(account.id, folder.local.as_str())
            .await?;
        Ok(if has_rows {
            self.settings.incremental_lookback_days
        } else {
            self.settings.full_lookback_days
        })
    }
}

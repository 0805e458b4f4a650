//! In-memory ports sharing one call journal, so tests can assert ordering
//! across the mailbox, the session host, and workspace sync.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use warden_core::{
    AgentIdentity, AgentStatusInfo, ControlMessage, Mailbox, RepositorySync, Result,
    SessionDecoration, SessionHost, StatusSource, Supervisor, SupervisorConfig, SupervisorPorts,
    TrackerSync, WardenError,
};

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().expect("journal lock").push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("journal lock").clone()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries()
            .iter()
            .position(|entry| entry.starts_with(prefix))
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.position(prefix).is_some()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }
}

fn injected(what: &str) -> WardenError {
    WardenError::CommandFailed {
        command: what.to_string(),
        details: "injected failure".to_string(),
    }
}

#[derive(Clone, Default)]
pub struct FakeMailbox {
    pub journal: Journal,
    pub messages: Arc<Mutex<Vec<ControlMessage>>>,
    pub fail_inbox: Arc<AtomicBool>,
    pub garbage_inbox: Arc<AtomicBool>,
    pub fail_delete: Arc<AtomicBool>,
}

impl FakeMailbox {
    pub fn push(&self, message: ControlMessage) {
        self.messages.lock().expect("mailbox lock").push(message);
    }

    pub fn ids(&self) -> Vec<String> {
        self.messages
            .lock()
            .expect("mailbox lock")
            .iter()
            .map(|message| message.id.clone())
            .collect()
    }
}

impl Mailbox for FakeMailbox {
    fn inbox(&self) -> Result<Vec<ControlMessage>> {
        self.journal.push("inbox");
        if self.fail_inbox.load(Ordering::SeqCst) {
            return Err(injected("gt mail inbox"));
        }
        if self.garbage_inbox.load(Ordering::SeqCst) {
            let source = serde_json::from_str::<Vec<ControlMessage>>("You have no mail")
                .expect_err("not an inbox");
            return Err(WardenError::Json {
                context: "parsing inbox for deacon/".to_string(),
                source,
            });
        }
        Ok(self.messages.lock().expect("mailbox lock").clone())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.journal.push(format!("delete {id}"));
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("gt mail delete"));
        }
        self.messages
            .lock()
            .expect("mailbox lock")
            .retain(|message| message.id != id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeSessions {
    pub journal: Journal,
    pub live: Arc<Mutex<BTreeSet<String>>>,
    pub environment: Arc<Mutex<Vec<(String, String, String)>>>,
    pub fail_has: Arc<AtomicBool>,
    pub fail_kill: Arc<AtomicBool>,
    pub fail_create: Arc<AtomicBool>,
    pub fail_env: Arc<AtomicBool>,
    pub fail_theme: Arc<AtomicBool>,
    pub fail_send: Arc<AtomicBool>,
}

impl FakeSessions {
    pub fn start(&self, name: &str) {
        self.live.lock().expect("sessions lock").insert(name.to_string());
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.live.lock().expect("sessions lock").contains(name)
    }
}

impl SessionHost for FakeSessions {
    fn has_session(&self, name: &str) -> Result<bool> {
        self.journal.push(format!("has {name}"));
        if self.fail_has.load(Ordering::SeqCst) {
            return Err(injected("tmux has-session"));
        }
        Ok(self.is_live(name))
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        self.journal.push(format!("kill {name}"));
        if self.fail_kill.load(Ordering::SeqCst) {
            return Err(injected("tmux kill-session"));
        }
        self.live.lock().expect("sessions lock").remove(name);
        Ok(())
    }

    fn new_session(&self, name: &str, dir: &Path) -> Result<()> {
        self.journal.push(format!("create {name} {}", dir.display()));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(injected("tmux new-session"));
        }
        self.start(name);
        Ok(())
    }

    fn set_environment(&self, name: &str, key: &str, value: &str) -> Result<()> {
        self.journal.push(format!("env {name} {key}={value}"));
        if self.fail_env.load(Ordering::SeqCst) {
            return Err(injected("tmux set-environment"));
        }
        self.environment.lock().expect("env lock").push((
            name.to_string(),
            key.to_string(),
            value.to_string(),
        ));
        Ok(())
    }

    fn apply_theme(&self, name: &str, decoration: &SessionDecoration) -> Result<()> {
        self.journal
            .push(format!("theme {name} {}", decoration.status_label().trim()));
        if self.fail_theme.load(Ordering::SeqCst) {
            return Err(injected("tmux set-option"));
        }
        Ok(())
    }

    fn send_keys(&self, name: &str, line: &str) -> Result<()> {
        self.journal.push(format!("send {name} {line}"));
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(injected("tmux send-keys"));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FakeSync {
    pub journal: Journal,
    pub fail_all: Arc<AtomicBool>,
}

impl FakeSync {
    fn step(&self, entry: String) -> Result<()> {
        self.journal.push(entry);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(injected("sync"));
        }
        Ok(())
    }
}

impl RepositorySync for FakeSync {
    fn fetch(&self, dir: &Path, remote: &str) -> Result<()> {
        self.step(format!("fetch {remote} {}", dir.display()))
    }

    fn pull_rebase(&self, dir: &Path, remote: &str, branch: &str) -> Result<()> {
        self.step(format!("pull {remote} {branch} {}", dir.display()))
    }
}

impl TrackerSync for FakeSync {
    fn sync(&self, dir: &Path) -> Result<()> {
        self.step(format!("tracker {}", dir.display()))
    }
}

#[derive(Clone, Default)]
pub struct FakeStatus {
    pub journal: Journal,
    pub record: Arc<Mutex<Option<AgentStatusInfo>>>,
}

impl StatusSource for FakeStatus {
    fn fetch(&self, id: &str) -> Result<AgentStatusInfo> {
        self.journal.push(format!("status {id}"));
        self.record
            .lock()
            .expect("status lock")
            .clone()
            .ok_or_else(|| WardenError::StatusRecordNotFound(id.to_string()))
    }
}

pub struct Harness {
    pub town: TempDir,
    pub journal: Journal,
    pub mailbox: FakeMailbox,
    pub sessions: FakeSessions,
    pub sync: FakeSync,
    pub status: FakeStatus,
    pub config: SupervisorConfig,
}

impl Harness {
    pub fn new() -> Self {
        let town = tempfile::tempdir().expect("town dir");
        let journal = Journal::default();
        let mut config = SupervisorConfig::with_town_root(town.path());
        config.settle_interval_ms = 0;

        Self {
            mailbox: FakeMailbox {
                journal: journal.clone(),
                ..FakeMailbox::default()
            },
            sessions: FakeSessions {
                journal: journal.clone(),
                ..FakeSessions::default()
            },
            sync: FakeSync {
                journal: journal.clone(),
                ..FakeSync::default()
            },
            status: FakeStatus {
                journal: journal.clone(),
                ..FakeStatus::default()
            },
            journal,
            config,
            town,
        }
    }

    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(
            self.config.clone(),
            SupervisorPorts {
                mailbox: Box::new(self.mailbox.clone()),
                sessions: Box::new(self.sessions.clone()),
                repository: Box::new(self.sync.clone()),
                tracker: Box::new(self.sync.clone()),
                status: Box::new(self.status.clone()),
            },
        )
    }

    pub fn root(&self) -> &Path {
        self.town.path()
    }

    pub fn state_path(&self, identity: &str) -> PathBuf {
        AgentIdentity::parse(identity)
            .state_file(self.root())
            .expect("resolvable identity")
    }

    pub fn write_state(&self, identity: &str, state: serde_json::Value) {
        let path = self.state_path(identity);
        fs_err::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs_err::write(&path, serde_json::to_string_pretty(&state).expect("json")).expect("write");
    }

    pub fn read_state(&self, identity: &str) -> serde_json::Value {
        let content = fs_err::read_to_string(self.state_path(identity)).expect("read state");
        serde_json::from_str(&content).expect("parse state")
    }

    pub fn raw_state(&self, identity: &str) -> String {
        fs_err::read_to_string(self.state_path(identity)).expect("read state")
    }
}

pub fn lifecycle_message(
    id: &str,
    from: &str,
    body: &str,
    sent_at: DateTime<Utc>,
) -> ControlMessage {
    ControlMessage {
        id: id.to_string(),
        from: from.to_string(),
        to: "deacon/".to_string(),
        subject: "LIFECYCLE: x".to_string(),
        body: body.to_string(),
        timestamp: sent_at.to_rfc3339(),
        ..ControlMessage::default()
    }
}

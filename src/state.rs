use crate::config::AppConfig;
use crate::error::Result;
use crate::host::TabRegistry;
use crate::protocol::TabId;
use crate::recording::{spawn_coordinator, spawn_tab_agent, CoordinatorHandle, RecordingEvent, TabAgentHandle};
use crate::replay::Replayer;
use crate::store::{open_store, SessionStore};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Application global state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    /// Tabs known to the host, and the focused one.
    pub tabs: Arc<TabRegistry>,
    pub store: Arc<dyn SessionStore>,
    pub coordinator: CoordinatorHandle,
    /// Replay timeline of the session loaded in the replay UI.
    pub replayer: Arc<Mutex<Option<Replayer>>>,
    agents: Arc<Mutex<HashMap<TabId, TabAgentHandle>>>,
}

/// Listing entry for an open tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabInfo {
    pub tab_id: TabId,
    pub focused: bool,
    pub capturing: bool,
    pub buffered_events: usize,
}

impl AppState {
    /// Open the configured session store and spawn the coordinator.
    /// Must be called from within a tokio runtime.
    pub fn new(config: AppConfig) -> Result<Self> {
        let store = open_store(&config.storage)?;
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn SessionStore>) -> Self {
        let tabs = Arc::new(TabRegistry::new(Duration::from_millis(
            config.messaging.timeout_ms,
        )));
        let coordinator = spawn_coordinator(tabs.clone(), Arc::clone(&store));
        Self {
            config: Arc::new(RwLock::new(config)),
            tabs,
            store,
            coordinator,
            replayer: Arc::new(Mutex::new(None)),
            agents: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// A tab was opened: give it an agent. Returns `false` if it already had one.
    pub fn open_tab(&self, tab_id: TabId) -> bool {
        let mut agents = self.agents.lock();
        if agents.get(&tab_id).is_some_and(|a| !a.is_finished()) {
            return false;
        }
        let handle = spawn_tab_agent(&self.tabs, tab_id, self.coordinator.clone());
        agents.insert(tab_id, handle);
        tracing::info!("Tab {} opened", tab_id);
        true
    }

    /// A tab was closed: its agent stops listening. Whatever it had captured
    /// but not yet transmitted is lost, as with a closed page.
    pub fn close_tab(&self, tab_id: TabId) -> bool {
        let had_agent = self.agents.lock().remove(&tab_id).is_some();
        let was_registered = self.tabs.unregister(tab_id);
        if had_agent || was_registered {
            tracing::info!("Tab {} closed", tab_id);
        }
        had_agent || was_registered
    }

    /// Host tab-activation notification.
    pub fn activate_tab(&self, tab_id: TabId) -> Result<()> {
        self.tabs.set_active(tab_id);
        self.coordinator.tab_activated(tab_id)
    }

    /// Events emitted by the page recorder of `tab_id`. Returns how many were
    /// buffered, or `None` if the tab is not open.
    pub fn emit_events(&self, tab_id: TabId, events: Vec<RecordingEvent>) -> Option<usize> {
        self.agents.lock().get(&tab_id).map(|a| a.emit(events))
    }

    pub fn tab_infos(&self) -> Vec<TabInfo> {
        let focused = self.tabs.active();
        let agents = self.agents.lock();
        let mut infos: Vec<TabInfo> = agents
            .values()
            .map(|a| TabInfo {
                tab_id: a.tab_id(),
                focused: focused == Some(a.tab_id()),
                capturing: a.is_active(),
                buffered_events: a.buffered(),
            })
            .collect();
        infos.sort_by_key(|t| t.tab_id);
        infos
    }
}

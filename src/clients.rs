use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Source of client ids. Ids are unique and increasing for the lifetime of the process.
#[derive(Debug)]
pub struct ClientIds(AtomicU64);

impl ClientIds {
    pub fn new() -> ClientIds {
        ClientIds(AtomicU64::new(1))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for ClientIds {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub id: u64,
    pub addr: String,
    pub name: Option<String>,
    pub db: usize,
}

impl Client {
    /// One line of `CLIENT LIST` / `CLIENT INFO`.
    pub fn info(&self) -> String {
        format!(
            "id={} addr={} name={} db={}",
            self.id,
            self.addr,
            self.name.as_deref().unwrap_or_default(),
            self.db
        )
    }
}

/// Connected clients keyed by peer address. Guarded by its own lock, separate from the keyspace,
/// so connections come and go while commands run.
#[derive(Clone)]
pub struct Clients {
    inner: Arc<Mutex<HashMap<String, Client>>>,
    ids: Arc<ClientIds>,
}

impl Clients {
    pub fn new(ids: Arc<ClientIds>) -> Clients {
        Clients {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ids,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Client>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new connection and returns its id.
    pub fn register(&self, addr: &str) -> u64 {
        let id = self.ids.next();
        let client = Client {
            id,
            addr: addr.to_string(),
            name: None,
            db: 0,
        };
        self.lock().insert(addr.to_string(), client);
        id
    }

    pub fn remove(&self, addr: &str) -> Option<Client> {
        self.lock().remove(addr)
    }

    pub fn get(&self, addr: &str) -> Option<Client> {
        self.lock().get(addr).cloned()
    }

    pub fn selected_db(&self, addr: &str) -> usize {
        self.lock().get(addr).map(|c| c.db).unwrap_or_default()
    }

    pub fn select(&self, addr: &str, db: usize) {
        if let Some(client) = self.lock().get_mut(addr) {
            client.db = db;
        }
    }

    pub fn set_name(&self, addr: &str, name: Option<String>) {
        if let Some(client) = self.lock().get_mut(addr) {
            client.name = name;
        }
    }

    /// Back to the state of a fresh connection, keeping the id.
    pub fn reset(&self, addr: &str) {
        if let Some(client) = self.lock().get_mut(addr) {
            client.name = None;
            client.db = 0;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every client, oldest first.
    pub fn list(&self) -> Vec<Client> {
        let mut clients: Vec<Client> = self.lock().values().cloned().collect();
        clients.sort_by_key(|c| c.id);
        clients
    }
}

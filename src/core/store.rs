use anyhow::Result;
use rusqlite::{Connection, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

use super::error::AutomationResult;
use super::types::{Action, Event, Listener};

/// One table per entity. Each holds `(id, record_json)` rows and is
/// rewritten in full on every save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Events,
    Listeners,
    Actions,
}

impl Collection {
    fn table(self) -> &'static str {
        match self {
            Collection::Events => "events",
            Collection::Listeners => "listeners",
            Collection::Actions => "actions",
        }
    }
}

pub(crate) trait Record {
    fn record_id(&self) -> &str;
}

impl Record for Event {
    fn record_id(&self) -> &str {
        &self.event_id
    }
}

impl Record for Listener {
    fn record_id(&self) -> &str {
        &self.id
    }
}

impl Record for Action {
    fn record_id(&self) -> &str {
        &self.action_id
    }
}

pub struct Persistence {
    db: Arc<Mutex<Connection>>,
}

impl Persistence {
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        if !data_dir.exists() {
            fs::create_dir_all(data_dir).await?;
        }
        let db_path = data_dir.join("nudge.db");
        let db = Connection::open(&db_path)?;
        Self::init_schema(&db)?;
        info!("Opened automation store at {:?}", db_path);
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn init_schema(db: &Connection) -> rusqlite::Result<()> {
        for collection in [
            Collection::Events,
            Collection::Listeners,
            Collection::Actions,
        ] {
            db.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        id TEXT PRIMARY KEY,
                        record_json TEXT NOT NULL,
                        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
                    )",
                    collection.table()
                ),
                [],
            )?;
        }
        Ok(())
    }

    pub async fn load_events(&self) -> AutomationResult<Vec<Event>> {
        self.load_collection(Collection::Events).await
    }

    pub async fn load_listeners(&self) -> AutomationResult<Vec<Listener>> {
        self.load_collection(Collection::Listeners).await
    }

    pub async fn load_actions(&self) -> AutomationResult<Vec<Action>> {
        self.load_collection(Collection::Actions).await
    }

    pub async fn save_events<'a, I>(&self, events: I) -> AutomationResult<()>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        self.save_collection(Collection::Events, events).await
    }

    pub async fn save_listeners<'a, I>(&self, listeners: I) -> AutomationResult<()>
    where
        I: IntoIterator<Item = &'a Listener>,
    {
        self.save_collection(Collection::Listeners, listeners).await
    }

    pub async fn save_actions<'a, I>(&self, actions: I) -> AutomationResult<()>
    where
        I: IntoIterator<Item = &'a Action>,
    {
        self.save_collection(Collection::Actions, actions).await
    }

    async fn load_collection<T: DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> AutomationResult<Vec<T>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT record_json FROM {} ORDER BY rowid",
            collection.table()
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(serde_json::from_str(&row?)?);
        }
        Ok(results)
    }

    async fn save_collection<'a, T, I>(&self, collection: Collection, records: I) -> AutomationResult<()>
    where
        T: Record + Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        // Encode before touching the database so a bad record cannot leave
        // the table half-written.
        let mut encoded = Vec::new();
        for record in records {
            encoded.push((record.record_id().to_string(), serde_json::to_string(record)?));
        }

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        tx.execute(&format!("DELETE FROM {}", collection.table()), [])?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (id, record_json) VALUES (?1, ?2)",
                collection.table()
            ))?;
            for (id, json) in &encoded {
                stmt.execute(params![id, json])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

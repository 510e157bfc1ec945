//! Transaction handling for database operations
//!
//! The scheduler's commit path writes a price-reduction event and the
//! listing's price fields as one unit; this module gives it a single
//! transaction surface over PostgreSQL with an in-memory stand-in for
//! tests.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};

use crate::error::{Error, Result};

/// Transaction handle, PostgreSQL or in-memory
pub enum DBTransaction {
    /// PostgreSQL transaction
    Postgres(PgTransaction),
    /// In-memory transaction
    InMemory(InMemoryTransaction),
}

impl DBTransaction {
    /// Commit the transaction
    pub async fn commit(self) -> Result<()> {
        match self {
            DBTransaction::Postgres(tx) => tx.commit().await,
            DBTransaction::InMemory(tx) => tx.commit().await,
        }
    }

    /// Roll the transaction back
    pub async fn rollback(self) -> Result<()> {
        match self {
            DBTransaction::Postgres(tx) => tx.rollback().await,
            DBTransaction::InMemory(tx) => tx.rollback().await,
        }
    }

    /// Execute a query against the transaction
    pub async fn execute<'a, E>(&mut self, query: E) -> Result<u64>
    where
        E: sqlx::Execute<'a, Postgres> + Send + 'a,
    {
        match self {
            DBTransaction::Postgres(tx) => tx.execute(query).await,
            DBTransaction::InMemory(tx) => tx.execute(query).await,
        }
    }
}

/// A PostgreSQL transaction
pub struct PgTransaction {
    tx: SqlxTransaction<'static, Postgres>,
}

impl PgTransaction {
    /// Wrap an sqlx transaction
    pub fn new(tx: SqlxTransaction<'static, Postgres>) -> Self {
        Self { tx }
    }

    /// Execute a query within this transaction
    pub async fn execute<'a, E>(&mut self, query: E) -> Result<u64>
    where
        E: sqlx::Execute<'a, Postgres> + Send + 'a,
    {
        use sqlx::Executor;
        self.tx
            .execute(query)
            .await
            .map(|r| r.rows_affected())
            .map_err(Error::Database)
    }

    /// Commit the transaction
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(Error::Database)
    }

    /// Roll the transaction back
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(Error::Database)
    }
}

/// Creates transactions for a repository backend
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Begin a new transaction
    async fn begin_transaction(&self) -> Result<DBTransaction>;
}

/// Transaction manager over a PostgreSQL pool
pub struct PgTransactionManager {
    pool: PgPool,
}

impl PgTransactionManager {
    /// Create a manager for the given pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionManager for PgTransactionManager {
    async fn begin_transaction(&self) -> Result<DBTransaction> {
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(DBTransaction::Postgres(PgTransaction::new(tx)))
    }
}

/// In-memory transaction for tests; records the outcome, nothing more
pub struct InMemoryTransaction {
    committed: bool,
    rolled_back: bool,
}

impl InMemoryTransaction {
    /// Create a new in-memory transaction
    pub fn new() -> Self {
        Self {
            committed: false,
            rolled_back: false,
        }
    }

    /// Whether this transaction was committed
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Whether this transaction was rolled back
    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back
    }

    /// Execute a query (no-op)
    pub async fn execute<'a, E>(&mut self, _query: E) -> Result<u64>
    where
        E: Send + 'a,
    {
        Ok(1)
    }

    /// Commit the transaction
    pub async fn commit(mut self) -> Result<()> {
        self.committed = true;
        Ok(())
    }

    /// Roll the transaction back
    pub async fn rollback(mut self) -> Result<()> {
        self.rolled_back = true;
        Ok(())
    }
}

impl Default for InMemoryTransaction {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory transaction manager for tests
pub struct InMemoryTransactionManager;

impl InMemoryTransactionManager {
    /// Create a new in-memory transaction manager
    pub fn new() -> Self {
        Self
    }
}

impl Default for InMemoryTransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionManager for InMemoryTransactionManager {
    async fn begin_transaction(&self) -> Result<DBTransaction> {
        Ok(DBTransaction::InMemory(InMemoryTransaction::new()))
    }
}

use redis::{RedisError, aio::MultiplexedConnection};
use tokio::sync::RwLock;
use tracing::debug;

use super::{KeyValueStore, StoreError};

/// [`KeyValueStore`] backed by a Redis server over a multiplexed tokio connection.
pub struct RedisStore {
    client: redis::Client,
    addr: String,
    connection: RwLock<Option<MultiplexedConnection>>,
}

impl RedisStore {
    pub fn new(host: &str, port: u16) -> Result<Self, StoreError> {
        let addr = format!("{host}:{port}");
        let client = redis::Client::open(format!("redis://{addr}/"))
            .map_err(|err| StoreError::Protocol(err.to_string()))?;

        Ok(Self {
            client,
            addr,
            connection: RwLock::new(None),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        // The multiplexed handle is cheap to clone; the lock is never held across a command.
        self.connection
            .read()
            .await
            .clone()
            .ok_or(StoreError::NotConnected)
    }

    fn classify(&self, err: RedisError) -> StoreError {
        if err.is_connection_refusal() {
            StoreError::ConnectionRefused(self.addr.clone())
        } else if err.is_io_error() || err.is_connection_dropped() {
            StoreError::ConnectionLost(err.to_string())
        } else {
            StoreError::Protocol(err.to_string())
        }
    }
}

impl KeyValueStore for RedisStore {
    async fn connect(&self) -> Result<(), StoreError> {
        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| self.classify(err))?;

        *self.connection.write().await = Some(connection);
        debug!(addr = %self.addr, "redis connection established");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut connection = self.connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut connection)
            .await
            .map_err(|err| self.classify(err))?;

        raw.map(|value| {
            value
                .trim()
                .parse::<i64>()
                .map_err(|_| StoreError::InvalidValue(value))
        })
        .transpose()
    }

    async fn incr_by(&self, key: &str, delta: u64) -> Result<i64, StoreError> {
        let mut connection = self.connection().await?;
        redis::cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .query_async(&mut connection)
            .await
            .map_err(|err| self.classify(err))
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), StoreError> {
        let mut connection = self.connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut connection)
            .await
            .map_err(|err| self.classify(err))
    }

    async fn quit(&self) -> Result<(), StoreError> {
        let Some(mut connection) = self.connection.write().await.take() else {
            return Ok(());
        };

        match redis::cmd("QUIT").query_async::<()>(&mut connection).await {
            Ok(()) => Ok(()),
            // The server may close the socket before the reply is read.
            Err(err) if err.is_connection_dropped() => Ok(()),
            Err(err) => Err(self.classify(err)),
        }
    }
}

// Redis Key-Value Store
//
// Backend for a shared Redis instance. Batches run as a single Lua script, so
// no other client observes or interleaves with a half-applied batch.

use crate::error::StoreError;
use crate::kv::{KeyValueStore, KvWrite};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use std::collections::HashSet;

// ARGV is a flat list of opcode-prefixed writes; KEYS are consumed in order.
const BATCH_SCRIPT: &str = r#"
local a, k = 1, 1
while a <= #ARGV do
  local op = ARGV[a]
  if op == 'sadd' then
    redis.call('SADD', KEYS[k], ARGV[a + 1]); k = k + 1; a = a + 2
  elseif op == 'srem' then
    redis.call('SREM', KEYS[k], ARGV[a + 1]); k = k + 1; a = a + 2
  elseif op == 'set' then
    redis.call('SET', KEYS[k], ARGV[a + 1]); k = k + 1; a = a + 2
  elseif op == 'del' then
    redis.call('DEL', KEYS[k]); k = k + 1; a = a + 1
  elseif op == 'mirror' then
    if redis.call('SISMEMBER', KEYS[k], ARGV[a + 1]) == 1 then
      redis.call('SET', KEYS[k + 1], ARGV[a + 2])
    else
      redis.call('DEL', KEYS[k + 1])
    end
    k = k + 2; a = a + 3
  else
    return redis.error_reply('unknown batch op ' .. op)
  end
end
return #ARGV
"#;

fn map_err(operation: &'static str) -> impl Fn(redis::RedisError) -> StoreError {
    move |e| StoreError::unavailable(operation, e.to_string())
}

/// Redis-backed store. Clones share one multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    batch_script: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(map_err("connect"))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_err("connect"))?;
        tracing::info!("Connected to Redis at {}", url);
        Ok(Self {
            conn,
            batch_script: Script::new(BATCH_SCRIPT),
        })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn backend_name(&self) -> &str {
        "redis"
    }

    async fn add_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let added: i64 = conn
            .sadd(key, member)
            .await
            .map_err(map_err("add_member"))?;
        Ok(added > 0)
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .srem(key, member)
            .await
            .map_err(map_err("remove_member"))?;
        Ok(removed > 0)
    }

    async fn members(&self, key: &str) -> Result<HashSet<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await.map_err(map_err("members"))
    }

    async fn contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        conn.sismember(key, member)
            .await
            .map_err(map_err("contains"))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await.map_err(map_err("set"))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(map_err("get"))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn.del(key).await.map_err(map_err("delete"))?;
        Ok(deleted > 0)
    }

    async fn write_batch(&self, ops: &[KvWrite]) -> Result<(), StoreError> {
        let mut invocation = self.batch_script.prepare_invoke();
        for op in ops {
            match op {
                KvWrite::AddMember { key, member } => {
                    invocation.key(key.as_str()).arg("sadd").arg(member.as_str());
                }
                KvWrite::RemoveMember { key, member } => {
                    invocation.key(key.as_str()).arg("srem").arg(member.as_str());
                }
                KvWrite::Set { key, value } => {
                    invocation.key(key.as_str()).arg("set").arg(value.as_str());
                }
                KvWrite::Delete { key } => {
                    invocation.key(key.as_str()).arg("del");
                }
                KvWrite::MirrorMembership {
                    set_key,
                    member,
                    key,
                    value,
                } => {
                    invocation
                        .key(set_key.as_str())
                        .key(key.as_str())
                        .arg("mirror")
                        .arg(member.as_str())
                        .arg(value.as_str());
                }
            }
        }

        let mut conn = self.conn.clone();
        let _: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(map_err("write_batch"))?;
        Ok(())
    }

    fn atomic_batches(&self) -> bool {
        true
    }
}

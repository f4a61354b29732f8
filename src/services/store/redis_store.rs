// src/services/store/redis_store.rs
use async_trait::async_trait;
use chrono::Utc;
use redis::{aio::MultiplexedConnection, Client, Script};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use tracing;

use crate::{
    errors::{DispatchError, DispatchResult},
    models::{
        driver::{Driver, DriverFilter, DriverPatch},
        ride::{NewRide, Ride},
    },
    services::store::{DriverStore, RideStore},
    utils::id_generator::{IdGenerator, IdType},
};

// Driver records are JSON strings; flag changes run server-side so a claim
// can never interleave with a location or online update. A missing or null
// activeRide means no ride holds the driver.
const CLAIM_DRIVER_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local d = cjson.decode(raw)
local held = d['activeRide'] ~= nil and d['activeRide'] ~= cjson.null
if d['verified'] == true and d['online'] == true and d['available'] == true and not held then
  d['available'] = false
  d['activeRide'] = ARGV[1]
  d['updatedAt'] = ARGV[2]
  redis.call('SET', KEYS[1], cjson.encode(d))
  return 1
end
return 0
"#;

const RELEASE_DRIVER_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local d = cjson.decode(raw)
local holder = d['activeRide']
if holder ~= nil and holder ~= cjson.null and holder ~= ARGV[1] then return 0 end
d['activeRide'] = cjson.null
if d['online'] == true then d['available'] = true end
d['updatedAt'] = ARGV[2]
redis.call('SET', KEYS[1], cjson.encode(d))
return 1
"#;

const PATCH_DRIVER_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return false end
local d = cjson.decode(raw)
local patch = cjson.decode(ARGV[1])
for field, value in pairs(patch) do
  if value ~= cjson.null then d[field] = value end
end
if d['activeRide'] ~= nil and d['activeRide'] ~= cjson.null then d['available'] = false end
d['updatedAt'] = ARGV[2]
local encoded = cjson.encode(d)
redis.call('SET', KEYS[1], encoded)
return encoded
"#;

#[derive(Debug, Clone)]
pub enum StoreKey {
    Simple(String),
    Composite(Vec<String>),
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKey::Simple(key) => f.write_str(key),
            StoreKey::Composite(parts) => f.write_str(&parts.join(":")),
        }
    }
}

// Key generators for stored records
pub struct StoreKeys;

impl StoreKeys {
    pub fn ride_by_id(ride_id: &str) -> StoreKey {
        StoreKey::Composite(vec!["ride".to_string(), "id".to_string(), ride_id.to_string()])
    }

    pub fn driver_by_id(driver_id: &str) -> StoreKey {
        StoreKey::Composite(vec!["driver".to_string(), "id".to_string(), driver_id.to_string()])
    }

    pub fn all_drivers() -> StoreKey {
        StoreKey::Simple("drivers:all".to_string())
    }
}

pub struct RedisStore {
    connection: MultiplexedConnection,
    claim_script: Script,
    release_script: Script,
    patch_script: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> DispatchResult<Self> {
        let client = Client::open(redis_url)?;
        let connection = client.get_multiplexed_tokio_connection().await?;
        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            connection,
            claim_script: Script::new(CLAIM_DRIVER_SCRIPT),
            release_script: Script::new(RELEASE_DRIVER_SCRIPT),
            patch_script: Script::new(PATCH_DRIVER_SCRIPT),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &StoreKey) -> DispatchResult<Option<T>> {
        let mut conn = self.connection.clone();
        let data: Option<String> = redis::cmd("GET")
            .arg(key.to_string())
            .query_async(&mut conn)
            .await?;

        data.map(|json| decode(key, &json)).transpose()
    }

    async fn set_json<T: Serialize>(&self, key: &StoreKey, value: &T) -> DispatchResult<()> {
        let json = serde_json::to_string(value)?;
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(key.to_string())
            .arg(json)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(key: &StoreKey, json: &str) -> DispatchResult<T> {
    serde_json::from_str(json)
        .map_err(|e| DispatchError::StorageCorrupted(format!("{}: {}", key, e)))
}

#[async_trait]
impl RideStore for RedisStore {
    async fn create_ride(&self, request: NewRide) -> DispatchResult<Ride> {
        let ride = Ride::new(IdGenerator::generate(IdType::Ride), request);
        self.set_json(&StoreKeys::ride_by_id(&ride.id), &ride).await?;
        tracing::debug!("Stored ride {}", ride.id);
        Ok(ride)
    }

    async fn find_ride(&self, ride_id: &str) -> DispatchResult<Option<Ride>> {
        self.get_json(&StoreKeys::ride_by_id(ride_id)).await
    }

    async fn save_ride(&self, ride: &Ride) -> DispatchResult<()> {
        self.set_json(&StoreKeys::ride_by_id(&ride.id), ride).await
    }
}

#[async_trait]
impl DriverStore for RedisStore {
    async fn find_driver(&self, driver_id: &str) -> DispatchResult<Option<Driver>> {
        self.get_json(&StoreKeys::driver_by_id(driver_id)).await
    }

    async fn upsert_driver(&self, driver: Driver) -> DispatchResult<()> {
        self.set_json(&StoreKeys::driver_by_id(&driver.id), &driver).await?;

        let mut conn = self.connection.clone();
        let _: () = redis::cmd("SADD")
            .arg(StoreKeys::all_drivers().to_string())
            .arg(&driver.id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn update_driver(&self, driver_id: &str, patch: DriverPatch) -> DispatchResult<Option<Driver>> {
        let key = StoreKeys::driver_by_id(driver_id);
        let patch_json = serde_json::to_string(&patch)?;
        let mut conn = self.connection.clone();

        let updated: Option<String> = self
            .patch_script
            .key(key.to_string())
            .arg(patch_json)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        updated.map(|json| decode(&key, &json)).transpose()
    }

    async fn find_eligible_drivers(&self, filter: &DriverFilter) -> DispatchResult<Vec<Driver>> {
        let mut conn = self.connection.clone();
        let ids: Vec<String> = redis::cmd("SMEMBERS")
            .arg(StoreKeys::all_drivers().to_string())
            .query_async(&mut conn)
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| StoreKeys::driver_by_id(id).to_string()).collect();
        let records: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut drivers = Vec::with_capacity(records.len());
        for (id, record) in ids.iter().zip(records) {
            let Some(json) = record else { continue };
            match decode::<Driver>(&StoreKeys::driver_by_id(id), &json) {
                Ok(driver) if filter.matches(&driver) => drivers.push(driver),
                Ok(_) => {}
                // One bad record should not hide every other driver
                Err(e) => tracing::warn!("Skipping driver {}: {}", id, e),
            }
        }
        drivers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(drivers)
    }

    async fn claim_driver(&self, driver_id: &str, ride_id: &str) -> DispatchResult<bool> {
        let mut conn = self.connection.clone();
        let claimed: i64 = self
            .claim_script
            .key(StoreKeys::driver_by_id(driver_id).to_string())
            .arg(ride_id)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;
        Ok(claimed == 1)
    }

    async fn release_driver(&self, driver_id: &str, ride_id: &str) -> DispatchResult<()> {
        let mut conn = self.connection.clone();
        let released: i64 = self
            .release_script
            .key(StoreKeys::driver_by_id(driver_id).to_string())
            .arg(ride_id)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await?;
        if released == 0 {
            tracing::debug!("Driver {} not released for ride {}", driver_id, ride_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(StoreKeys::ride_by_id("rid-1").to_string(), "ride:id:rid-1");
        assert_eq!(StoreKeys::driver_by_id("drv-1").to_string(), "driver:id:drv-1");
        assert_eq!(StoreKeys::all_drivers().to_string(), "drivers:all");
    }

    #[test]
    fn test_patch_serializes_unset_fields_as_null() {
        // The patch script skips nulls, so unset fields must serialize as null
        let value = serde_json::to_value(DriverPatch::available(true)).unwrap();
        assert_eq!(value["available"], true);
        assert!(value["online"].is_null());
        assert!(value["lastKnownLocation"].is_null());
    }

    #[test]
    fn test_corrupted_record_is_reported() {
        let err = decode::<Driver>(&StoreKeys::driver_by_id("drv-1"), "{not json").unwrap_err();
        assert!(matches!(err, DispatchError::StorageCorrupted(_)));
    }
}

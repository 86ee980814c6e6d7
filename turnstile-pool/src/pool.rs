use turnstile_core::Services;

use crate::bucket::Bucket;
use crate::error::PoolError;

/// The full hierarchy of worker sockets backing a router instance.
///
/// `bucket_count` is `ceil(number_of_users / (users_per_socket *
/// sockets_per_bucket))`, computed once at construction via
/// [`turnstile_common::TurnstileConfig::bucket_count`].
pub struct WorkerPool {
    buckets: Vec<Bucket>,
}

impl WorkerPool {
    pub fn new(services: &Services) -> Self {
        let config = &services.config;
        let bucket_count = config.bucket_count();
        let buckets = (0..bucket_count)
            .map(|i| {
                let base_port = config.user_port_start + (i * config.sockets_per_bucket) as u16;
                Bucket::new(
                    base_port,
                    config.sockets_per_bucket,
                    config.users_per_socket as usize,
                    services.clone(),
                )
            })
            .collect();
        Self { buckets }
    }

    pub async fn start_all(&self) -> Result<(), PoolError> {
        for bucket in &self.buckets {
            bucket.start_all().await?;
        }
        Ok(())
    }

    pub async fn shutdown_all(&self) {
        for bucket in &self.buckets {
            bucket.shutdown_all().await;
        }
    }

    /// First-fit scan across buckets, returning the assigned port.
    /// `None` means every bucket is at capacity.
    pub async fn reserve(&self, key: u32, username: &str) -> Option<u16> {
        for bucket in &self.buckets {
            if let Some(port) = bucket.reserve(key, username).await {
                return Some(port);
            }
        }
        None
    }

    /// A bit per bucket, set when that bucket has no free slot.
    /// Computed on demand rather than maintained incrementally, since
    /// it's read far less often than slots change.
    pub async fn bucket_status(&self) -> Vec<bool> {
        let mut status = Vec::with_capacity(self.buckets.len());
        for bucket in &self.buckets {
            status.push(bucket.is_full().await);
        }
        status
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use turnstile_common::{FileUserStore, TurnstileConfig};

    async fn services(cfg: TurnstileConfig) -> Services {
        let dir = std::env::temp_dir().join(format!("turnstile-pool-test-{}", rand::random::<u64>()));
        let store = FileUserStore::open(&dir).await.unwrap();
        Services::new(cfg, Arc::new(store))
    }

    #[tokio::test]
    async fn bucket_count_follows_config() {
        let cfg = TurnstileConfig {
            number_of_users: 10,
            sockets_per_bucket: 2,
            users_per_socket: 5,
            ..Default::default()
        };
        let services = services(cfg).await;
        let pool = WorkerPool::new(&services);
        assert_eq!(pool.bucket_count(), 1);
    }

    #[tokio::test]
    async fn reserve_spans_multiple_buckets() {
        let cfg = TurnstileConfig {
            number_of_users: 4,
            sockets_per_bucket: 1,
            users_per_socket: 1,
            user_port_start: 21000,
            ..Default::default()
        };
        let services = services(cfg).await;
        let pool = WorkerPool::new(&services);
        assert_eq!(pool.bucket_count(), 4);

        let mut ports = Vec::new();
        for i in 0..4 {
            ports.push(pool.reserve(i, "user").await.unwrap());
        }
        ports.sort_unstable();
        assert_eq!(ports, vec![21000, 21001, 21002, 21003]);
        assert!(pool.reserve(99, "overflow").await.is_none());
        assert!(pool.bucket_status().await.iter().all(|&full| full));
    }
}

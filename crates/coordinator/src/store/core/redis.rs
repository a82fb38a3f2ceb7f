use log::info;
use redis::Client;
#[cfg(test)]
use redis_test::server::RedisServer;
#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::thread;
#[cfg(test)]
use std::time::Duration;

#[derive(Clone)]
pub struct RedisStore {
    pub client: Client,
    #[allow(dead_code)]
    #[cfg(test)]
    server: Option<Arc<RedisServer>>,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = Client::open(redis_url)?;
        info!("Using redis archive at {redis_url}");
        Ok(Self {
            client,
            #[cfg(test)]
            server: None,
        })
    }

    #[cfg(test)]
    pub fn test_server_available() -> bool {
        std::process::Command::new("redis-server")
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success())
    }

    /// Spawns a throwaway redis-server for the lifetime of the store.
    #[cfg(test)]
    pub fn new_test() -> Self {
        let server = RedisServer::new();
        let (host, port) = match server.client_addr() {
            redis::ConnectionAddr::Tcp(host, port) => (host.clone(), *port),
            _ => panic!("Expected TCP connection"),
        };
        let redis_url = format!("redis://{host}:{port}");
        log::debug!("Starting test Redis server at {redis_url}");

        let client = loop {
            if let Ok(client) = Client::open(redis_url.clone()) {
                if let Ok(mut conn) = client.get_connection() {
                    if redis::cmd("PING").query::<String>(&mut conn).is_ok() {
                        break client;
                    }
                }
            }
            thread::sleep(Duration::from_millis(100));
        };

        Self {
            client,
            server: Some(Arc::new(server)),
        }
    }
}

//! Network Reachability Monitor
//!
//! Periodically opens a TCP connection to a well-known target and turns
//! reachability transitions into [`ManagerEvent::Online`] and
//! [`ManagerEvent::Offline`].

use super::events::ManagerEvent;
use super::manager::ConnectionManager;
use crate::domain::NetworkSettings;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct NetworkMonitor {
    settings: NetworkSettings,
    /// Last observed reachability; `None` until the first check
    online: Option<bool>,
}

impl NetworkMonitor {
    pub fn new(settings: NetworkSettings) -> Self {
        Self {
            settings,
            online: None,
        }
    }

    pub fn is_online(&self) -> Option<bool> {
        self.online
    }

    /// Whether the target accepts a TCP connection within the timeout
    pub async fn check(&self) -> bool {
        let connect = TcpStream::connect(self.settings.target.as_str());
        match tokio::time::timeout(self.settings.timeout(), connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!("Reachability check to {} failed: {}", self.settings.target, e);
                false
            }
            Err(_) => {
                tracing::debug!("Reachability check to {} timed out", self.settings.target);
                false
            }
        }
    }

    /// Record an observation. The first one only sets the baseline; later
    /// ones yield an event on a transition.
    pub fn observe(&mut self, online: bool) -> Option<ManagerEvent> {
        let previous = self.online.replace(online);
        match previous {
            Some(was) if was != online => Some(if online {
                ManagerEvent::Online
            } else {
                ManagerEvent::Offline
            }),
            _ => None,
        }
    }

    /// Run checks forever, delivering transitions to `manager`
    pub fn spawn(mut self, manager: ConnectionManager) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.settings.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                "Network monitor watching {} every {}s",
                self.settings.target,
                self.settings.interval().as_secs()
            );

            loop {
                ticker.tick().await;
                let online = self.check().await;
                if let Some(event) = self.observe(online) {
                    tracing::info!("Network is now {}", if online { "online" } else { "offline" });
                    manager.handle(event);
                }
            }
        })
    }
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("target", &self.settings.target)
            .field("online", &self.online)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn settings(target: String) -> NetworkSettings {
        NetworkSettings {
            target,
            timeout_ms: 500,
            ..NetworkSettings::default()
        }
    }

    #[test]
    fn test_first_observation_is_silent() {
        let mut monitor = NetworkMonitor::new(NetworkSettings::default());
        assert_eq!(monitor.observe(false), None);
        assert_eq!(monitor.is_online(), Some(false));
    }

    #[test]
    fn test_transitions_emit_events() {
        let mut monitor = NetworkMonitor::new(NetworkSettings::default());
        monitor.observe(true);
        assert_eq!(monitor.observe(true), None);
        assert_eq!(monitor.observe(false), Some(ManagerEvent::Offline));
        assert_eq!(monitor.observe(false), None);
        assert_eq!(monitor.observe(true), Some(ManagerEvent::Online));
    }

    #[tokio::test]
    async fn test_check_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let monitor = NetworkMonitor::new(settings(addr.to_string()));
        assert!(monitor.check().await);

        drop(listener);
        let monitor = NetworkMonitor::new(settings(addr.to_string()));
        assert!(!monitor.check().await);
    }

    #[test]
    fn test_settings_floor() {
        let settings = NetworkSettings {
            interval_secs: 0,
            timeout_ms: 0,
            ..NetworkSettings::default()
        };
        assert_eq!(settings.interval(), Duration::from_secs(1));
        assert_eq!(settings.timeout(), Duration::from_millis(1));
    }
}

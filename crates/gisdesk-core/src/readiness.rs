//! Readiness probing for freshly launched processes.
//!
//! `Delay` sleeps the whole budget. Every other probe polls with exponential
//! backoff until it succeeds, the process exits, or the budget runs out.

use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::{DisplayConfig, Readiness};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(1);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// How a readiness wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Ready,
    TimedOut,
    Exited,
}

/// Wait for `probe` to pass within `budget`. `alive` is polled between
/// attempts so a crashed process ends the wait early.
pub async fn wait_ready<F>(
    probe: &Readiness,
    display: &DisplayConfig,
    budget: Duration,
    mut alive: F,
) -> ReadyState
where
    F: FnMut() -> bool,
{
    if *probe == Readiness::Delay {
        tokio::time::sleep(budget).await;
        return ReadyState::Ready;
    }

    let deadline = Instant::now() + budget;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if !alive() {
            return ReadyState::Exited;
        }
        if check(probe, display).await {
            return ReadyState::Ready;
        }

        let now = Instant::now();
        if now >= deadline {
            return ReadyState::TimedOut;
        }

        tokio::time::sleep(backoff.min(deadline - now)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// One readiness attempt.
pub async fn check(probe: &Readiness, display: &DisplayConfig) -> bool {
    match probe {
        Readiness::Delay => true,
        Readiness::Socket { path } => {
            let path = display.expand(path);
            Path::new(&path).exists()
        }
        Readiness::Tcp { port } => {
            let Ok(port) = display.expand(port).parse::<u16>() else {
                return false;
            };
            let connect = tokio::net::TcpStream::connect(("127.0.0.1", port));
            matches!(tokio::time::timeout(CONNECT_TIMEOUT, connect).await, Ok(Ok(_)))
        }
        Readiness::Http { url } => {
            let url = display.expand(url);
            let Ok(client) = reqwest::Client::builder().timeout(MAX_BACKOFF).build() else {
                return false;
            };
            match client.get(&url).send().await {
                Ok(resp) => {
                    debug!("{} answered {}", url, resp.status());
                    true
                }
                Err(_) => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_delay_sleeps_budget() {
        let start = std::time::Instant::now();
        let state = wait_ready(
            &Readiness::Delay,
            &DisplayConfig::default(),
            Duration::from_millis(50),
            || false,
        )
        .await;
        // Delay does not look at liveness
        assert_eq!(state, ReadyState::Ready);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_socket_ready_when_file_exists() {
        let temp = tempdir().expect("Failed to create temp dir");
        std::fs::create_dir(temp.path().join(".X11-unix")).unwrap();
        std::fs::write(temp.path().join(".X11-unix").join("X7"), "").unwrap();

        let display = DisplayConfig {
            number: 7,
            tmp_dir: temp.path().to_path_buf(),
            ..DisplayConfig::default()
        };
        let probe = Readiness::Socket {
            path: "{tmp_dir}/.X11-unix/X{display_number}".to_string(),
        };

        let state = wait_ready(&probe, &display, Duration::from_secs(1), || true).await;
        assert_eq!(state, ReadyState::Ready);
    }

    #[tokio::test]
    async fn test_socket_times_out() {
        let temp = tempdir().expect("Failed to create temp dir");
        let probe = Readiness::Socket {
            path: temp.path().join("never").display().to_string(),
        };

        let state = wait_ready(
            &probe,
            &DisplayConfig::default(),
            Duration::from_millis(250),
            || true,
        )
        .await;
        assert_eq!(state, ReadyState::TimedOut);
    }

    #[tokio::test]
    async fn test_exited_process_ends_wait() {
        let probe = Readiness::Socket {
            path: "/definitely/not/a/socket".to_string(),
        };
        let state = wait_ready(
            &probe,
            &DisplayConfig::default(),
            Duration::from_secs(30),
            || false,
        )
        .await;
        assert_eq!(state, ReadyState::Exited);
    }

    #[tokio::test]
    async fn test_tcp_ready_when_listening() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // The port comes from the display settings, not a fixed number
        let display = DisplayConfig {
            vnc_port: port,
            ..DisplayConfig::default()
        };
        let probe = Readiness::Tcp {
            port: "{vnc_port}".to_string(),
        };

        let state = wait_ready(&probe, &display, Duration::from_secs(2), || true).await;
        assert_eq!(state, ReadyState::Ready);
    }

    #[tokio::test]
    async fn test_tcp_closed_port_is_not_ready() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let probe = Readiness::Tcp {
            port: port.to_string(),
        };
        assert!(!check(&probe, &DisplayConfig::default()).await);

        // An unexpandable port is never ready
        let probe = Readiness::Tcp {
            port: "{no_such_port}".to_string(),
        };
        assert!(!check(&probe, &DisplayConfig::default()).await);
    }

    #[tokio::test]
    async fn test_zero_budget_checks_once() {
        let mut calls = 0;
        let state = wait_ready(
            &Readiness::Socket {
                path: "/definitely/not/a/socket".to_string(),
            },
            &DisplayConfig::default(),
            Duration::ZERO,
            || {
                calls += 1;
                true
            },
        )
        .await;
        assert_eq!(state, ReadyState::TimedOut);
        assert_eq!(calls, 1);
    }
}

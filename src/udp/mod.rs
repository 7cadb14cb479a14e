use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tracing::{debug, error, info, warn};

use crate::adif;
use crate::config::{Config, DeliveryConfig, OverflowPolicy, UdpConfig};
use crate::contact::{self, ContactRecord, Rejection};

/// Pause after an unexpected receive error before listening again
const ERROR_PAUSE: Duration = Duration::from_secs(1);

/// What happened to one datagram on the receive side
#[derive(Debug, PartialEq)]
pub enum IngestOutcome {
    /// Built and handed to the delivery worker
    Queued,
    /// Not a usable contact
    Rejected(Rejection),
    /// Built, but the delivery queue had no room
    Dropped,
    /// The delivery worker is gone
    Closed,
}

/// Bind the receive socket
///
/// Failure is fatal for the agent: usually another instance already owns
/// the port.
pub async fn bind(config: &UdpConfig) -> anyhow::Result<UdpSocket> {
    let addr = config.bind_addr();
    let socket = UdpSocket::bind(&addr).await.with_context(|| {
        format!(
            "Failed to bind UDP socket on {} (is another instance running?)",
            addr
        )
    })?;
    info!("UDP listener started on {}", socket.local_addr()?);
    Ok(socket)
}

/// Decode one datagram into a contact
///
/// Tag lengths count bytes on the wire, so the raw bytes are parsed; the
/// lossy text is only kept for `raw_adif`.
pub fn process_datagram(data: &[u8], config: &Config) -> Result<ContactRecord, Rejection> {
    let fields = adif::parse(data);
    contact::build(&fields, &String::from_utf8_lossy(data), config)
}

/// Hand a contact to the delivery worker, honouring the overflow policy
pub async fn enqueue(
    tx: &mpsc::Sender<ContactRecord>,
    contact: ContactRecord,
    config: &DeliveryConfig,
) -> IngestOutcome {
    match config.overflow {
        OverflowPolicy::DropNewest => match tx.try_send(contact) {
            Ok(()) => IngestOutcome::Queued,
            Err(TrySendError::Full(c)) => {
                warn!("Delivery queue full, dropping contact {}", c.summary());
                IngestOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => IngestOutcome::Closed,
        },
        OverflowPolicy::Block => {
            let timeout = Duration::from_millis(config.enqueue_timeout_ms);
            match tx.send_timeout(contact, timeout).await {
                Ok(()) => IngestOutcome::Queued,
                Err(SendTimeoutError::Timeout(c)) => {
                    warn!(
                        "Delivery queue still full after {:?}, dropping contact {}",
                        timeout,
                        c.summary()
                    );
                    IngestOutcome::Dropped
                }
                Err(SendTimeoutError::Closed(_)) => IngestOutcome::Closed,
            }
        }
    }
}

/// Run the whole receive-side pipeline for one datagram
pub async fn handle_datagram(
    data: &[u8],
    src: SocketAddr,
    config: &Config,
    tx: &mpsc::Sender<ContactRecord>,
) -> IngestOutcome {
    debug!("Received {} bytes from {}", data.len(), src);

    match process_datagram(data, config) {
        Ok(contact) => {
            debug!("Built contact {} from {}", contact.summary(), src);
            enqueue(tx, contact, &config.delivery).await
        }
        Err(rejection) => {
            warn!("Ignoring datagram from {}: {}", src, rejection);
            debug!(
                "  Raw: {}",
                String::from_utf8_lossy(&data[..data.len().min(100)])
            );
            IngestOutcome::Rejected(rejection)
        }
    }
}

/// Receive datagrams forever, feeding built contacts to `tx`
///
/// Only returns if the delivery worker has gone away.
pub async fn run_listener(
    socket: UdpSocket,
    config: Arc<Config>,
    tx: mpsc::Sender<ContactRecord>,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; 65535];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                error!("Error in receive loop: {}", e);
                tokio::time::sleep(ERROR_PAUSE).await;
                continue;
            }
        };

        if handle_datagram(&buf[..len], src, &config, &tx).await == IngestOutcome::Closed {
            anyhow::bail!("delivery worker stopped; no longer accepting contacts");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supabase::{self, testing::RecordingSink, RetryPolicy};

    const SAMPLE: &str = "<CALL:5>W1ABC<QSO_DATE:8>20240210<TIME_ON:6>143000<BAND:3>20m<MODE:3>SSB<FREQ:6>14.250<GRIDSQUARE:6>JO62qm<eor>";

    fn test_config() -> Config {
        Config::from_toml(
            r#"
            [supabase]
            url = "http://localhost:54321"
            key = "k"

            [udp]
            host = "127.0.0.1"
            port = 0

            [operator]
            callsign = "N1XYZ"
            "#,
        )
        .unwrap()
    }

    fn src() -> SocketAddr {
        "127.0.0.1:2237".parse().unwrap()
    }

    #[tokio::test]
    async fn test_valid_datagram_is_queued() {
        let config = test_config();
        let (tx, mut rx) = mpsc::channel(4);

        let outcome = handle_datagram(SAMPLE.as_bytes(), src(), &config, &tx).await;
        assert_eq!(outcome, IngestOutcome::Queued);

        let contact = rx.recv().await.unwrap();
        assert_eq!(contact.contacted_callsign, "W1ABC");
        assert_eq!(contact.operator_callsign, "N1XYZ");
    }

    #[tokio::test]
    async fn test_noise_is_rejected_without_queueing() {
        let config = test_config();
        let (tx, mut rx) = mpsc::channel(4);

        let outcome = handle_datagram(b"\x00\x01noise\xff", src(), &config, &tx).await;
        assert_eq!(outcome, IngestOutcome::Rejected(Rejection::Empty));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_utf8_does_not_shift_tag_lengths() {
        let config = test_config();
        let mut data = b"<CALL:4>K1AB<NOTES:15>".to_vec();
        data.extend_from_slice(&[0xff; 5]);
        data.extend_from_slice(b"<CALL:2>ZZ<eor>");

        // NOTES swallows the next 15 bytes, fake CALL tag included
        let contact = process_datagram(&data, &config).unwrap();
        assert_eq!(contact.contacted_callsign, "K1AB");
        assert!(contact.raw_adif.starts_with("<CALL:4>K1AB<NOTES:15>\u{FFFD}"));
    }

    #[tokio::test]
    async fn test_missing_call_is_rejected() {
        let config = test_config();
        let (tx, _rx) = mpsc::channel(4);

        let outcome = handle_datagram(b"<BAND:3>20m<eor>", src(), &config, &tx).await;
        assert_eq!(outcome, IngestOutcome::Rejected(Rejection::MissingCall));
    }

    #[tokio::test]
    async fn test_drop_newest_when_full() {
        let mut config = test_config();
        config.delivery.overflow = OverflowPolicy::DropNewest;
        let (tx, mut rx) = mpsc::channel(1);

        assert_eq!(
            handle_datagram(SAMPLE.as_bytes(), src(), &config, &tx).await,
            IngestOutcome::Queued
        );
        assert_eq!(
            handle_datagram(b"<CALL:4>K1AB", src(), &config, &tx).await,
            IngestOutcome::Dropped
        );

        // The queued record survives, the newest one was dropped
        assert_eq!(rx.recv().await.unwrap().contacted_callsign, "W1ABC");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_policy_times_out() {
        let mut config = test_config();
        config.delivery.overflow = OverflowPolicy::Block;
        config.delivery.enqueue_timeout_ms = 250;
        let (tx, _rx) = mpsc::channel(1);

        handle_datagram(SAMPLE.as_bytes(), src(), &config, &tx).await;
        let outcome = handle_datagram(b"<CALL:4>K1AB", src(), &config, &tx).await;
        assert_eq!(outcome, IngestOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_closed_queue_is_reported() {
        let config = test_config();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let outcome = handle_datagram(SAMPLE.as_bytes(), src(), &config, &tx).await;
        assert_eq!(outcome, IngestOutcome::Closed);
    }

    #[tokio::test]
    async fn test_bind_conflict_fails() {
        let first = bind(&test_config().udp).await.unwrap();
        let taken = UdpConfig {
            host: "127.0.0.1".to_string(),
            port: first.local_addr().unwrap().port(),
        };
        assert!(bind(&taken).await.is_err());
    }

    /// Real socket → listener → worker → sink
    #[tokio::test]
    async fn test_udp_end_to_end_delivers_each_datagram_once() {
        let config = Arc::new(test_config());
        let socket = bind(&config.udp).await.unwrap();
        let addr = socket.local_addr().unwrap();

        let sink = Arc::new(RecordingSink::default());
        let (tx, rx) = mpsc::channel(16);
        let worker = tokio::spawn(supabase::run_worker(
            sink.clone(),
            rx,
            RetryPolicy {
                attempts: 3,
                delay: Duration::ZERO,
            },
        ));
        let listener = tokio::spawn(run_listener(socket, config.clone(), tx));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(SAMPLE.as_bytes(), addr).await.unwrap();
        sender.send_to(b"random noise", addr).await.unwrap();
        sender.send_to(SAMPLE.as_bytes(), addr).await.unwrap();

        // Wait for both contacts to land
        for _ in 0..200 {
            if sink.accepted.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Stopping the listener closes the queue and lets the worker finish
        listener.abort();
        let stats = worker.await.unwrap();

        assert_eq!(stats.delivered, 2);
        assert_eq!(sink.calls(), 2);

        let accepted = sink.accepted.lock().unwrap();
        let contact = &accepted[0];
        assert_eq!(contact.contacted_callsign, "W1ABC");
        assert_eq!(contact.qso_date, "2024-02-10");
        assert_eq!(contact.time_on, "14:30:00");
        assert_eq!(contact.band.as_deref(), Some("20m"));
        assert_eq!(contact.mode.as_deref(), Some("SSB"));
        assert_eq!(contact.frequency, Some(14.25));
        assert_eq!(contact.operator_callsign, "N1XYZ");
        assert!(contact.location.as_deref().unwrap().starts_with("POINT(13.3"));
    }
}

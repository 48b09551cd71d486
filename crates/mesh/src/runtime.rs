//! Node event loop.
//!
//! One task owns the pipeline and handles exactly one event at a time:
//! timer ticks, inbound datagrams and traffic observations. Handlers are
//! synchronous, so nothing can interleave with an encode in progress.

use crate::error::{ExportError, ExportResult};
use crate::pipeline::{build_pipeline, ExportPipeline};
use crate::transport::UdpTransport;
use meshflow_core::{MeshAddress, NodeConfig, Role};
use meshflow_flow::UpdateOutcome;
use meshflow_ipfix::export_time_now;
use std::future::Future;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Receive buffer size; larger datagrams are truncated by the socket
pub const RECV_BUFFER_LEN: usize = u16::MAX as usize;

/// Queued traffic observations before new ones are dropped
pub const TRAFFIC_QUEUE_LEN: usize = 1024;

/// The closed set of events a pipeline reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent<'a> {
    /// Export period elapsed
    Tick {
        /// Seconds since the UNIX epoch
        export_time: u32,
    },
    /// A datagram arrived from the mesh
    DatagramArrived {
        /// Datagram bytes
        payload: &'a [u8],
        /// Mesh address of the sender
        sender: MeshAddress,
    },
    /// Local traffic was observed
    TrafficObserved {
        /// Flow key
        destination: MeshAddress,
        /// Packet size in bytes
        bytes: u64,
    },
}

/// Hand one event to the pipeline; returns the update outcome for traffic events
pub fn dispatch(pipeline: &mut dyn ExportPipeline, event: PipelineEvent<'_>) -> Option<UpdateOutcome> {
    match event {
        PipelineEvent::Tick { export_time } => {
            pipeline.on_tick(export_time);
            None
        }
        PipelineEvent::DatagramArrived { payload, sender } => {
            pipeline.on_datagram(payload, sender);
            None
        }
        PipelineEvent::TrafficObserved { destination, bytes } => {
            Some(pipeline.on_traffic(destination, bytes))
        }
    }
}

/// One observed packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficSample {
    /// Flow key
    pub destination: MeshAddress,
    /// Packet size in bytes
    pub bytes: u64,
}

/// Feeds traffic observations into a running node
#[derive(Debug, Clone)]
pub struct TrafficHandle {
    tx: mpsc::Sender<TrafficSample>,
}

impl TrafficHandle {
    /// Queue an observation without waiting; returns false when the queue
    /// is full or the node has stopped
    pub fn observe(&self, destination: MeshAddress, bytes: u64) -> bool {
        self.tx
            .try_send(TrafficSample { destination, bytes })
            .is_ok()
    }

    /// Queue an observation, waiting for room
    pub async fn observe_wait(&self, destination: MeshAddress, bytes: u64) -> ExportResult<()> {
        self.tx
            .send(TrafficSample { destination, bytes })
            .await
            .map_err(|_| ExportError::RuntimeStopped)
    }
}

fn sender_address(addr: SocketAddr) -> MeshAddress {
    match addr.ip() {
        IpAddr::V6(ip) => MeshAddress::new(ip),
        IpAddr::V4(ip) => MeshAddress::new(ip.to_ipv6_mapped()),
    }
}

/// A running node: bound socket, pipeline and event sources
pub struct NodeRuntime {
    role: Role,
    address: MeshAddress,
    period: Duration,
    socket: Arc<UdpSocket>,
    pipeline: Box<dyn ExportPipeline + Send>,
    traffic_tx: mpsc::Sender<TrafficSample>,
    traffic_rx: mpsc::Receiver<TrafficSample>,
}

impl NodeRuntime {
    /// Bind the node's socket and build its pipeline.
    ///
    /// The configuration is validated first. A socket that cannot be bound
    /// is fatal: there is no fallback transport.
    pub async fn bind(config: &NodeConfig) -> ExportResult<Self> {
        config.validate()?;
        let port = config.transport.listen_port;
        let local = SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port);
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| ExportError::TransportUnavailable { port, source })?;
        let socket = Arc::new(socket);

        let pipeline = build_pipeline(config, UdpTransport::new(Arc::clone(&socket)))?;
        let (traffic_tx, traffic_rx) = mpsc::channel(TRAFFIC_QUEUE_LEN);

        info!(
            role = %config.node.role,
            address = %config.node.address,
            port,
            interval_secs = config.export.interval_secs,
            "Node runtime bound"
        );
        Ok(Self {
            role: config.node.role,
            address: config.node.address,
            period: Duration::from_secs(config.export.interval_secs),
            socket,
            pipeline,
            traffic_tx,
            traffic_rx,
        })
    }

    /// Handle for feeding traffic observations
    pub fn traffic_handle(&self) -> TrafficHandle {
        TrafficHandle {
            tx: self.traffic_tx.clone(),
        }
    }

    /// Local socket address
    pub fn local_addr(&self) -> ExportResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Run until ctrl-c
    pub async fn run(self) -> ExportResult<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` completes
    pub async fn run_until<F>(self, shutdown: F) -> ExportResult<()>
    where
        F: Future<Output = ()>,
    {
        let NodeRuntime {
            role,
            address,
            period,
            socket,
            mut pipeline,
            traffic_tx,
            mut traffic_rx,
        } = self;
        // Only external handles keep the traffic queue open.
        drop(traffic_tx);

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval fires immediately.
        ticker.tick().await;

        let mut recv_buf = vec![0u8; RECV_BUFFER_LEN];
        let mut traffic_open = true;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(%role, %address, "Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    dispatch(
                        pipeline.as_mut(),
                        PipelineEvent::Tick { export_time: export_time_now() },
                    );
                }
                received = socket.recv_from(&mut recv_buf) => match received {
                    Ok((len, from)) => {
                        dispatch(
                            pipeline.as_mut(),
                            PipelineEvent::DatagramArrived {
                                payload: &recv_buf[..len],
                                sender: sender_address(from),
                            },
                        );
                    }
                    Err(e) => warn!(error = %e, "Datagram receive failed"),
                },
                sample = traffic_rx.recv(), if traffic_open => match sample {
                    Some(TrafficSample { destination, bytes }) => {
                        dispatch(
                            pipeline.as_mut(),
                            PipelineEvent::TrafficObserved { destination, bytes },
                        );
                    }
                    None => {
                        debug!("Traffic source closed");
                        traffic_open = false;
                    }
                },
            }
        }

        let stats = pipeline.stats();
        info!(
            observed = stats.observed_packets,
            rejected = stats.rejected_flows,
            sent = stats.messages_sent,
            failures = stats.send_failures,
            dropped = stats.dropped_payloads,
            "Node runtime stopped"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standard::StandardPipeline;
    use crate::transport::{Endpoint, RecordingTransport};
    use meshflow_core::{Encoding, ExportConfig};

    #[test]
    fn test_dispatch_routes_events() {
        let config = ExportConfig {
            encoding: Encoding::Full,
            ..ExportConfig::default()
        };
        let mut pipeline = StandardPipeline::new(
            &config,
            Endpoint::new("fd00::ff".parse().unwrap(), 4739),
            RecordingTransport::new(),
        )
        .unwrap();
        let destination: MeshAddress = "fd00::a".parse().unwrap();

        let outcome = dispatch(
            &mut pipeline,
            PipelineEvent::TrafficObserved {
                destination,
                bytes: 64,
            },
        );
        assert_eq!(outcome, Some(UpdateOutcome::Created));
        assert_eq!(
            dispatch(
                &mut pipeline,
                PipelineEvent::DatagramArrived {
                    payload: &[1, 2, 3],
                    sender: destination,
                },
            ),
            None
        );
        dispatch(&mut pipeline, PipelineEvent::Tick { export_time: 9 });
        assert_eq!(pipeline.transport().sent().len(), 2);
        assert!(pipeline.table().is_empty());
    }

    #[test]
    fn test_sender_address_maps_ipv4() {
        let v4: SocketAddr = "10.0.0.1:1230".parse().unwrap();
        assert_eq!(sender_address(v4).to_string(), "::ffff:10.0.0.1");
        let v6: SocketAddr = "[fd00::2]:1230".parse().unwrap();
        assert_eq!(sender_address(v6).to_string(), "fd00::2");
    }

    #[tokio::test]
    async fn test_traffic_handle_queues_samples() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = TrafficHandle { tx };
        let destination: MeshAddress = "fd00::a".parse().unwrap();
        assert!(handle.observe(destination, 10));
        assert!(!handle.observe(destination, 11));
        assert_eq!(
            rx.recv().await,
            Some(TrafficSample {
                destination,
                bytes: 10
            })
        );
        drop(rx);
        assert!(matches!(
            handle.observe_wait(destination, 1).await,
            Err(ExportError::RuntimeStopped)
        ));
    }

    fn gateway_config(listen_port: u16) -> NodeConfig {
        let mut config = NodeConfig::default_config("fd00::ff".parse().unwrap(), Role::Gateway);
        config.transport.collector = Some("fd00::100".parse().unwrap());
        config.transport.listen_port = listen_port;
        config
    }

    #[tokio::test]
    async fn test_bind_on_taken_port_is_transport_unavailable() {
        let held = std::net::UdpSocket::bind("[::]:0").unwrap();
        let port = held.local_addr().unwrap().port();

        let result = NodeRuntime::bind(&gateway_config(port)).await;
        match result {
            Err(ExportError::TransportUnavailable { port: failed, .. }) => assert_eq!(failed, port),
            other => panic!("expected TransportUnavailable, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let mut config = gateway_config(0);
        config.export.interval_secs = 0;
        assert!(matches!(
            NodeRuntime::bind(&config).await,
            Err(ExportError::Core(_))
        ));
    }
}

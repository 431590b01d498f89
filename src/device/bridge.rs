//! TCP link to an external device bridge
//!
//! The bridge process owns the serial connection to the arm and speaks a
//! line protocol: one JSON `ArmCommand` per line in, one JSON reply per line
//! out, sent once the arm acknowledged the command.
//!
//! ```text
//! -> {"cmd":"move_to","x":247.4,"y":-0.2,"z":126.4,"r":0.0}
//! <- {"ok":true}
//! -> {"cmd":"get_pose"}
//! <- {"ok":true,"pose":{"position":{...},"joints":{...}}}
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use super::{ArmCommand, ArmLink, ArmPose, DeviceError, LinkConnector, Pose4, SpeedProfile};

#[derive(Debug, Deserialize)]
struct BridgeReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    pose: Option<ArmPose>,
}

pub struct BridgeLink {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl BridgeLink {
    pub fn new(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    async fn send(&mut self, command: &ArmCommand) -> Result<BridgeReply, DeviceError> {
        let mut line = serde_json::to_string(command).map_err(|e| DeviceError::Link(e.to_string()))?;
        line.push('\n');
        debug!(command = command.name(), "Sending to bridge");

        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| DeviceError::Link(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| DeviceError::Link(e.to_string()))?;

        let mut reply = String::new();
        let read = self
            .reader
            .read_line(&mut reply)
            .await
            .map_err(|e| DeviceError::Link(e.to_string()))?;
        if read == 0 {
            return Err(DeviceError::Link("bridge closed the connection".to_string()));
        }

        let reply: BridgeReply = serde_json::from_str(reply.trim())
            .map_err(|e| DeviceError::Link(format!("unreadable bridge reply: {e}")))?;
        if !reply.ok {
            return Err(DeviceError::Rejected {
                command: command.name().to_string(),
                reason: reply.error.unwrap_or_else(|| "no reason given".to_string()),
            });
        }
        Ok(reply)
    }
}

#[async_trait]
impl ArmLink for BridgeLink {
    async fn set_speed(&mut self, speed: SpeedProfile) -> Result<(), DeviceError> {
        self.send(&ArmCommand::SetSpeed {
            velocity: speed.velocity,
            acceleration: speed.acceleration,
        })
        .await
        .map(|_| ())
    }

    async fn move_to(&mut self, target: Pose4) -> Result<(), DeviceError> {
        self.send(&target.into()).await.map(|_| ())
    }

    async fn set_suction(&mut self, on: bool) -> Result<(), DeviceError> {
        self.send(&ArmCommand::Suction { on }).await.map(|_| ())
    }

    async fn home(&mut self) -> Result<(), DeviceError> {
        self.send(&ArmCommand::Home).await.map(|_| ())
    }

    async fn pose(&mut self) -> Result<ArmPose, DeviceError> {
        self.send(&ArmCommand::GetPose)
            .await?
            .pose
            .ok_or_else(|| DeviceError::Link("bridge reply carried no pose".to_string()))
    }

    async fn close(&mut self) -> Result<(), DeviceError> {
        self.send(&ArmCommand::Close).await?;
        self.writer
            .shutdown()
            .await
            .map_err(|e| DeviceError::Link(e.to_string()))
    }
}

/// Connects to a device bridge listening on `addr`
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    addr: String,
}

impl BridgeConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl LinkConnector for BridgeConnector {
    fn describe(&self) -> String {
        format!("bridge://{}", self.addr)
    }

    async fn open(&self) -> Result<Box<dyn ArmLink>, DeviceError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| DeviceError::ConnectionFailed(format!("{}: {}", self.addr, e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| DeviceError::ConnectionFailed(e.to_string()))?;
        Ok(Box::new(BridgeLink::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ConnectOutcome, DeviceGateway, JointAngles};
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Bridge that acknowledges everything except suction, and echoes the
    /// received commands back through the join handle
    async fn fake_bridge() -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            let mut received = Vec::new();

            while let Some(line) = lines.next_line().await.unwrap() {
                let reply = if line.contains("\"get_pose\"") {
                    serde_json::json!({
                        "ok": true,
                        "pose": {
                            "position": {"x": 1.0, "y": 2.0, "z": 3.0, "r": 4.0},
                            "joints": {"j1": 10.0, "j2": 20.0, "j3": 30.0, "j4": 40.0}
                        }
                    })
                } else if line.contains("\"suction\"") {
                    serde_json::json!({"ok": false, "error": "pump offline"})
                } else {
                    serde_json::json!({"ok": true})
                };
                let closing = line.contains("\"close\"");
                received.push(line);
                write.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
                if closing {
                    break;
                }
            }
            received
        });

        (addr, task)
    }

    #[tokio::test]
    async fn test_gateway_over_bridge() {
        let (addr, bridge) = fake_bridge().await;
        let mut gateway = DeviceGateway::new(
            Box::new(BridgeConnector::new(addr)),
            Duration::from_secs(2),
            Duration::from_secs(2),
        );

        assert_eq!(gateway.connect().await.unwrap(), ConnectOutcome::Connected);
        gateway.move_to(Pose4::new(247.4, -0.2, 126.4, 0.0)).await.unwrap();

        let pose = gateway.current_pose().await.unwrap();
        assert_eq!(pose.position, Pose4::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(
            pose.joints,
            JointAngles { j1: 10.0, j2: 20.0, j3: 30.0, j4: 40.0 }
        );

        let err = gateway.set_suction(true).await.unwrap_err();
        assert_eq!(
            err,
            DeviceError::Rejected {
                command: "suction".to_string(),
                reason: "pump offline".to_string()
            }
        );

        gateway.disconnect().await.unwrap();
        let received = bridge.await.unwrap();
        assert_eq!(received.len(), 4);
        assert!(received[0].contains("\"move_to\""));
        assert!(received[3].contains("\"close\""));
    }

    #[tokio::test]
    async fn test_unreachable_bridge() {
        // bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let connector = BridgeConnector::new(addr);
        assert!(matches!(
            connector.open().await,
            Err(DeviceError::ConnectionFailed(_))
        ));
    }
}

use anyhow::Result;

use super::{report, AppContext, Command};
use crate::boundary::Request;

/// One-shot arm command: status, pose, home, move-to or set-speed
pub struct DeviceCommand {
    request: Request,
}

impl DeviceCommand {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    fn banner(&self) -> String {
        match &self.request {
            Request::Status => "🔌 Checking arm connection...".to_string(),
            Request::Connect => "🔌 Connecting to arm...".to_string(),
            Request::Pose => "📍 Reading arm pose...".to_string(),
            Request::Home => "🏠 Homing arm...".to_string(),
            Request::MoveTo { x, y, z, r, .. } => format!("🦾 Moving arm to ({x}, {y}, {z}, r={r})..."),
            Request::SetSpeed {
                velocity,
                acceleration,
            } => format!("⚡ Setting speed to velocity {velocity}, acceleration {acceleration}..."),
            other => format!("🔧 Running {}...", other.name()),
        }
    }
}

impl Command for DeviceCommand {
    async fn execute(&self, context: &AppContext) -> Result<()> {
        println!("{}", self.banner());

        let response = context.dispatcher.handle(self.request.clone()).await;
        if let (Request::Pose, Some(data)) = (&self.request, &response.data) {
            let value = |key: &str| data.get(key).and_then(|v| v.as_f64()).unwrap_or_default();
            println!(
                "   📍 x={:.2} y={:.2} z={:.2} r={:.2}",
                value("x"),
                value("y"),
                value("z"),
                value("r")
            );
            println!(
                "   🦴 joints j1={:.2} j2={:.2} j3={:.2} j4={:.2}",
                value("joint1"),
                value("joint2"),
                value("joint3"),
                value("joint4")
            );
        }
        report(&response)
    }
}

use anyhow::Result;

use super::{AppContext, Command};
use crate::store::{SlotStatus, SlotView};

pub struct ZonesCommand {
    pub available_only: bool,
}

impl ZonesCommand {
    pub fn new() -> Self {
        Self { available_only: false }
    }

    pub fn available_only(mut self, available_only: bool) -> Self {
        self.available_only = available_only;
        self
    }
}

impl Default for ZonesCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for ZonesCommand {
    async fn execute(&self, context: &AppContext) -> Result<()> {
        let orchestrator = context.orchestrator();

        if self.available_only {
            let names = orchestrator.available_zones().await?;
            if names.is_empty() {
                println!("📋 No zones available");
            } else {
                println!("🟢 AVAILABLE ZONES: {}", names.join(", "));
            }
            return Ok(());
        }

        let zones: Vec<SlotView> = orchestrator.zones().await?.iter().map(SlotView::from).collect();
        println!("🗺️  ZONES");
        println!("────────");
        for zone in &zones {
            match zone.status {
                SlotStatus::Available => {
                    println!("🟢 {:<4} ({:.1}, {:.1}, {:.1})  available", zone.name, zone.x, zone.y, zone.z);
                }
                SlotStatus::Occupied => {
                    println!(
                        "📦 {:<4} ({:.1}, {:.1}, {:.1})  {} [{}]",
                        zone.name,
                        zone.x,
                        zone.y,
                        zone.z,
                        zone.product_code.as_deref().unwrap_or("?"),
                        zone.product_type.as_deref().unwrap_or("")
                    );
                    if let Some(info) = zone.additional_info.as_deref().filter(|i| !i.is_empty()) {
                        println!("        📝 {info}");
                    }
                    if let Some(stored_at) = zone.datetime {
                        println!("        🕒 stored {}", stored_at.format("%Y-%m-%d %H:%M:%S UTC"));
                    }
                }
            }
        }

        let occupied = zones.iter().filter(|z| z.status == SlotStatus::Occupied).count();
        println!();
        println!("📊 {} of {} zones occupied", occupied, zones.len());
        Ok(())
    }
}

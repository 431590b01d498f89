use anyhow::Result;

use super::{report, AppContext, Command};
use crate::boundary::Request;
use crate::cli::SpeedArgs;
use crate::orchestrator::{RetrieveRequest, StoreRequest};

pub struct StoreCommand {
    pub zone: String,
    pub product_type: String,
    pub info: String,
    pub max_attempts: Option<u32>,
    pub speed: SpeedArgs,
}

impl StoreCommand {
    pub fn new(zone: impl Into<String>, product_type: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            product_type: product_type.into(),
            info: String::new(),
            max_attempts: None,
            speed: SpeedArgs::default(),
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_speed(mut self, speed: SpeedArgs) -> Self {
        self.speed = speed;
        self
    }
}

impl Command for StoreCommand {
    async fn execute(&self, context: &AppContext) -> Result<()> {
        println!("📦 Storing package in zone {}...", self.zone);
        println!("   🔍 Reading the package code at the pickup point");
        println!();

        let mut request = StoreRequest::new(&self.zone, &self.product_type, &self.info);
        request.speed = context.speed(&self.speed);
        request.max_attempts = self.max_attempts;

        let response = context.dispatcher.handle(Request::Store(request)).await;
        if let Some(data) = &response.data {
            if let Some(code) = data.get("product_code").and_then(|c| c.as_str()) {
                println!("🏷️  Product code: {code}");
            }
            if let Some(attempts) = data.get("attempts").and_then(|a| a.as_u64()) {
                println!("🔁 Identification attempts: {attempts}");
            }
        }
        report(&response)
    }
}

pub struct RetrieveCommand {
    pub zone: String,
    pub speed: SpeedArgs,
}

impl RetrieveCommand {
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            speed: SpeedArgs::default(),
        }
    }

    pub fn with_speed(mut self, speed: SpeedArgs) -> Self {
        self.speed = speed;
        self
    }
}

impl Command for RetrieveCommand {
    async fn execute(&self, context: &AppContext) -> Result<()> {
        println!("📤 Retrieving package from zone {}...", self.zone);
        println!();

        let mut request = RetrieveRequest::new(&self.zone);
        request.speed = context.speed(&self.speed);

        let response = context.dispatcher.handle(Request::Retrieve(request)).await;
        if let Some(code) = response
            .data
            .as_ref()
            .and_then(|d| d.pointer("/item/product_code"))
            .and_then(|c| c.as_str())
        {
            println!("🏷️  Product code: {code}");
        }
        report(&response)
    }
}

//! Handler that writes every event as one JSON line.

use std::io::{self, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use herald_core::error::{HandlerError, HandlerResult};
use herald_core::models::CWEvent;
use herald_core::ports::EventHandler;
use serde_json::Value;

/// Prints events as JSON lines and passes the serialized event on.
pub struct JsonLinesHandler<W> {
    out: Mutex<W>,
}

impl JsonLinesHandler<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLinesHandler<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<W: Write + Send + 'static> EventHandler for JsonLinesHandler<W> {
    fn name(&self) -> &'static str {
        "json-lines"
    }

    async fn handle(
        &self,
        event: &CWEvent,
        _previous: Option<Value>,
    ) -> HandlerResult<Option<Value>> {
        let value = serde_json::to_value(event)?;
        let mut out = self.out.lock().map_err(|_| HandlerError::Failed {
            handler: self.name().to_string(),
            message: "output lock poisoned".into(),
        })?;
        serde_json::to_writer(&mut *out, &value)?;
        writeln!(out)?;
        out.flush()?;
        Ok(Some(value))
    }
}

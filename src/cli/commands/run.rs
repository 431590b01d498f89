use anyhow::Result;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{AppContext, Command};
use crate::boundary::{Dispatcher, RequestEnvelope, Response};
use crate::shutdown::ShutdownCoordinator;

/// Serve JSON-lines requests from stdin, one response line per request
pub struct RunCommand;

impl Command for RunCommand {
    async fn execute(&self, context: &AppContext) -> Result<()> {
        eprintln!("🔁 Serving JSON-lines requests on stdin (ctrl-c to stop)");

        let (requests, _) = serve(
            context.dispatcher.clone(),
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            ShutdownCoordinator::wait_for_signal(),
        )
        .await?;

        eprintln!("👋 Handled {requests} requests");
        Ok(())
    }
}

/// Dispatch every request line concurrently until `input` ends, fails, or
/// `shutdown` resolves. Requests already accepted are always run to
/// completion and answered; a line that is not UTF-8 or not a request gets
/// an error response.
///
/// Responses are written in completion order; a request's `id` is echoed
/// back so callers can match them up. Returns the number of request lines
/// and the output sink.
pub async fn serve<R, W, S>(dispatcher: Dispatcher, input: R, output: W, shutdown: S) -> Result<(usize, W)>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    S: Future<Output = Result<()>>,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(response) = rx.recv().await {
            let mut line = serde_json::to_string(&response)?;
            line.push('\n');
            output.write_all(line.as_bytes()).await?;
            output.flush().await?;
        }
        Ok::<_, anyhow::Error>(output)
    });

    let mut input = input;
    let mut buf = Vec::new();
    let mut in_flight = JoinSet::new();
    let mut requests = 0;
    let mut read_error = None;
    tokio::pin!(shutdown);

    loop {
        buf.clear();
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "Shutdown signal handler failed");
                }
                info!(in_flight = in_flight.len(), "No longer accepting requests");
                break;
            }
            read = input.read_until(b'\n', &mut buf) => {
                match read {
                    Ok(0) => {
                        debug!("Request stream closed");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // accepted requests still run to completion below
                        error!(error = %e, in_flight = in_flight.len(), "Request stream failed");
                        read_error = Some(e);
                        break;
                    }
                }

                let line = match std::str::from_utf8(&buf) {
                    Ok(line) => line.trim(),
                    Err(e) => {
                        requests += 1;
                        warn!(error = %e, "Rejected request line that is not UTF-8");
                        answer(&tx, Response::invalid(format!("Invalid request: {e}")));
                        continue;
                    }
                };
                if line.is_empty() {
                    continue;
                }
                requests += 1;

                match serde_json::from_str::<RequestEnvelope>(line) {
                    Ok(envelope) => {
                        let dispatcher = dispatcher.clone();
                        let tx = tx.clone();
                        in_flight.spawn(async move {
                            let response = dispatcher.handle_envelope(envelope).await;
                            answer(&tx, response);
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Rejected malformed request line");
                        answer(&tx, Response::invalid(format!("Invalid request: {e}")));
                    }
                }
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Request handler did not finish");
        }
    }
    drop(tx);

    let output = writer.await??;
    if let Some(e) = read_error {
        return Err(e.into());
    }
    Ok((requests, output))
}

fn answer(tx: &mpsc::UnboundedSender<Response>, response: Response) {
    if let Err(e) = tx.send(response) {
        warn!(id = ?e.0.id, status = ?e.0.status, "Response writer is gone, dropping response");
    }
}

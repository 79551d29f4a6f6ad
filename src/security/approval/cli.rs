use super::{ApprovalBroker, ApprovalDecision, ConfirmationRequest};
use anyhow::Result;
use chrono::Utc;
use console::style;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Prompts on the terminal. The prompt never outlives the confirmation
/// deadline, nor `max_wait` when set.
pub struct CliApprovalBroker {
    max_wait: Option<Duration>,
}

impl CliApprovalBroker {
    pub fn new() -> Self {
        Self { max_wait: None }
    }

    pub fn with_max_wait(max_wait: Duration) -> Self {
        Self {
            max_wait: Some(max_wait),
        }
    }

    fn wait_budget(&self, request: &ConfirmationRequest) -> Duration {
        let remaining = request.remaining(Utc::now());
        self.max_wait.map_or(remaining, |cap| cap.min(remaining))
    }
}

impl ApprovalBroker for CliApprovalBroker {
    fn request_approval<'a>(
        &'a self,
        request: &'a ConfirmationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApprovalDecision>> + Send + 'a>> {
        Box::pin(async move {
            let budget = self.wait_budget(request);

            eprintln!();
            eprintln!("{}", style("┌─ Confirmation Required ──────────────────────────").yellow().bold());
            eprintln!("│ Tool:    {}", style(request.tool_name()).cyan());
            eprintln!("│ Step:    {}", request.step_id());
            eprintln!("│ Action:  {}", request.summary());
            eprintln!("│ Why:     {}", style(request.rationale()).dim());
            eprintln!("│ Expires: {}s", budget.as_secs());
            eprintln!("├──────────────────────────────────────────────────");
            eprintln!("│ [A]pprove  [D]eny");
            eprintln!("└──────────────────────────────────────────────────");
            eprint!("  > ");

            match tokio::time::timeout(budget, read_single_char()).await {
                Ok(Ok(ch)) => Ok(parse_answer(ch)),
                Ok(Err(e)) => Ok(ApprovalDecision::Denied {
                    reason: format!("input error: {e}"),
                }),
                Err(_) => Ok(ApprovalDecision::Denied {
                    reason: "no answer before the deadline".to_string(),
                }),
            }
        })
    }
}

fn parse_answer(ch: char) -> ApprovalDecision {
    match ch.to_ascii_lowercase() {
        'a' | 'y' => ApprovalDecision::Approved,
        'd' | 'n' => ApprovalDecision::Denied {
            reason: "denied by user".to_string(),
        },
        other => ApprovalDecision::Denied {
            reason: format!("unrecognized input: '{other}'"),
        },
    }
}

async fn read_single_char() -> Result<char> {
    // stdin is blocking
    let ch = tokio::task::spawn_blocking(|| {
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        input
            .trim()
            .chars()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no input received"))
    })
    .await??;
    Ok(ch)
}

use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::sync::Arc;
use steadyload_core::template::materialize;
use steadyload_core::{AttemptResult, AttemptStatus, Invoker, RunConfig, Transport};
use tracing::{info, warn};

/// Pre-check outcome as seen by the operator.
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
}

/// A pre-check fails on a transport error or any status >= 400.
pub fn judge(result: &AttemptResult) -> Verdict {
    match result.status {
        AttemptStatus::Error => Verdict::Failed,
        AttemptStatus::Http(code) if code >= 400 => Verdict::Failed,
        AttemptStatus::Http(_) => Verdict::Passed,
    }
}

/// Send one request to the first target.
pub async fn run_precheck(transport: Arc<dyn Transport>, config: &RunConfig) -> Result<AttemptResult> {
    let paths = config.validate().context("Invalid run configuration")?;
    let invoker = Invoker::new(transport, Arc::new(paths));
    let body = config.body_template.as_ref().map(materialize);
    let target = config.target_for(0);

    let result = invoker.invoke(0, target, &config.method, body.as_ref()).await;
    info!(
        url = target,
        status = %result.status,
        latency_ms = (result.latency_secs * 1000.0) as u64,
        "pre-check finished"
    );
    Ok(result)
}

/// Ask whether to continue after a failed pre-check. Only `y` continues.
pub fn confirm_continue<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<bool> {
    write!(output, "Do you want to continue with the load test? (y/n): ")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("y"))
}

/// Run the pre-check and decide whether the load test should proceed.
pub async fn gate(transport: Arc<dyn Transport>, config: &RunConfig, assume_yes: bool) -> Result<bool> {
    println!("Performing pre-check...");
    let result = run_precheck(transport, config).await?;

    if judge(&result) == Verdict::Passed {
        return Ok(true);
    }

    println!("Pre-check failed. Error: {}", result.response);
    if assume_yes {
        warn!("pre-check failed, continuing because --yes was given");
        return Ok(true);
    }

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    confirm_continue(&mut stdin.lock(), &mut stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use steadyload_core::{HttpMethod, MockTransport};

    fn with_status(status: AttemptStatus) -> AttemptResult {
        AttemptResult {
            index: 0,
            url: "http://a".into(),
            method: HttpMethod::Get,
            status,
            latency_secs: 0.0,
            request: String::new(),
            request_body: String::new(),
            response: String::new(),
            extracted: Vec::new(),
        }
    }

    #[test]
    fn test_judge() {
        assert_eq!(judge(&with_status(AttemptStatus::Http(200))), Verdict::Passed);
        assert_eq!(judge(&with_status(AttemptStatus::Http(399))), Verdict::Passed);
        assert_eq!(judge(&with_status(AttemptStatus::Http(400))), Verdict::Failed);
        assert_eq!(judge(&with_status(AttemptStatus::Http(503))), Verdict::Failed);
        assert_eq!(judge(&with_status(AttemptStatus::Error)), Verdict::Failed);
    }

    #[test]
    fn test_confirm_continue() {
        let mut out = Vec::new();
        assert!(confirm_continue(&mut "y\n".as_bytes(), &mut out).unwrap());
        assert!(confirm_continue(&mut "Y\n".as_bytes(), &mut out).unwrap());
        assert!(!confirm_continue(&mut "n\n".as_bytes(), &mut out).unwrap());
        assert!(!confirm_continue(&mut "yes\n".as_bytes(), &mut out).unwrap());
        assert!(!confirm_continue(&mut "".as_bytes(), &mut out).unwrap());
        assert!(String::from_utf8(out).unwrap().contains("(y/n)"));
    }

    #[tokio::test]
    async fn test_precheck_uses_first_target() {
        let transport = Arc::new(MockTransport::new(Duration::ZERO, 404, "missing"));
        let config = RunConfig::new(vec!["http://first".into(), "http://second".into()], 5, 10);

        let result = run_precheck(transport, &config).await.unwrap();
        assert_eq!(result.url, "http://first");
        assert_eq!(judge(&result), Verdict::Failed);
    }
}

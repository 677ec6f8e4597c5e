//! EXEC: run a stored file as a shell script with captured output.
//!
//! The content is fetched from the owning storage node and handed to
//! `sh -c` with stdout and stderr captured. There is no sandbox; EXEC is
//! only safe among mutually trusting users (see DESIGN.md).

use std::process::Stdio;

use tokio::process::Command;

/// Runs `content` as a shell script and returns the combined
/// stdout+stderr, truncated to `limit` bytes.
pub async fn run_shell(content: &str, limit: usize) -> std::io::Result<String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(content)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.stderr.is_empty() {
        text.push_str(&String::from_utf8_lossy(&output.stderr));
    }
    if !output.status.success() {
        text.push_str(&format!("\n[exit status: {}]", output.status));
    }
    Ok(truncate_at_boundary(text, limit))
}

fn truncate_at_boundary(mut text: String, limit: usize) -> String {
    if text.len() <= limit {
        return text;
    }
    let mut cut = limit;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn captures_stdout() {
        let out = run_shell("echo hello", 4096).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test_log::test(tokio::test)]
    async fn captures_stderr_and_exit_status() {
        let out = run_shell("echo oops >&2; exit 3", 4096).await.unwrap();
        assert!(out.contains("oops"));
        assert!(out.contains("exit status"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "héllo".to_string();
        // 'é' is two bytes; cutting inside it must back off
        assert_eq!(truncate_at_boundary(text, 2), "h");
    }
}

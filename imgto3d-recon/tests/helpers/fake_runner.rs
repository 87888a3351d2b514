//! Scripted stand-in for the external photogrammetry tool
//!
//! Exit codes are scripted per subcommand (default 0). On success the fake
//! writes the files the real tool would produce, so result checks pass.

use async_trait::async_trait;
use imgto3d_common::Result;
use imgto3d_recon::services::stage_runner::LineSink;
use imgto3d_recon::services::{StageInvocation, StageOutcome, StageRunner};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct ScriptedStageRunner {
    exit_codes: Mutex<HashMap<String, VecDeque<i32>>>,
    lines: HashMap<String, Vec<String>>,
    block_on: HashSet<String>,
    skip_outputs: bool,
    invocations: Mutex<Vec<StageInvocation>>,
}

impl ScriptedStageRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successive exit codes for `subcommand`; 0 once exhausted
    pub fn with_exit_codes(self, subcommand: &str, codes: &[i32]) -> Self {
        self.exit_codes
            .lock()
            .unwrap()
            .insert(subcommand.to_string(), codes.iter().copied().collect());
        self
    }

    /// Output lines printed by `subcommand` before it exits
    pub fn with_lines(mut self, subcommand: &str, lines: &[&str]) -> Self {
        self.lines.insert(
            subcommand.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
        self
    }

    /// `subcommand` runs until cancelled
    pub fn blocking_on(mut self, subcommand: &str) -> Self {
        self.block_on.insert(subcommand.to_string());
        self
    }

    /// Succeed without writing any output files
    pub fn without_outputs(mut self) -> Self {
        self.skip_outputs = true;
        self
    }

    pub fn invocations(&self) -> Vec<StageInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Subcommand of each invocation in order
    pub fn subcommands(&self) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter_map(|inv| inv.args.first().cloned())
            .collect()
    }

    fn next_exit_code(&self, subcommand: &str) -> i32 {
        self.exit_codes
            .lock()
            .unwrap()
            .get_mut(subcommand)
            .and_then(|codes| codes.pop_front())
            .unwrap_or(0)
    }

    fn write_outputs(&self, invocation: &StageInvocation) {
        let subcommand = invocation.args[0].as_str();
        match subcommand {
            "model_converter" | "stereo_fusion" | "poisson_mesher" => {
                if let Some(out) = arg_value(invocation, "output_path") {
                    std::fs::create_dir_all(out.parent().unwrap()).unwrap();
                    std::fs::write(&out, b"ply\n").unwrap();
                }
            }
            "mapper" => {
                if let Some(out) = arg_value(invocation, "output_path") {
                    std::fs::create_dir_all(out.join("0")).unwrap();
                }
            }
            "patch_match_stereo" => {
                if let Some(ws) = arg_value(invocation, "workspace_path") {
                    let stereo = ws.join("stereo");
                    std::fs::create_dir_all(&stereo).unwrap();
                    std::fs::write(stereo.join("fusion.cfg"), b"").unwrap();
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl StageRunner for ScriptedStageRunner {
    async fn run(
        &self,
        invocation: &StageInvocation,
        on_line: &LineSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<StageOutcome> {
        self.invocations.lock().unwrap().push(invocation.clone());
        let subcommand = invocation.args.first().cloned().unwrap_or_default();

        let lines = self.lines.get(&subcommand).cloned().unwrap_or_default();
        for line in &lines {
            on_line(line);
        }

        if self.block_on.contains(&subcommand) {
            cancel.cancelled().await;
            return Ok(StageOutcome::cancelled());
        }

        let exit_code = self.next_exit_code(&subcommand);
        if exit_code == 0 && !self.skip_outputs {
            self.write_outputs(invocation);
        }

        let mut output_tail = lines.join("\n");
        if exit_code != 0 {
            output_tail.push_str(&format!("\n{} exited with {}", subcommand, exit_code));
        }
        Ok(StageOutcome {
            exit_code: Some(exit_code),
            output_tail,
            cancelled: false,
        })
    }
}

/// Value of `--key=value` in an invocation
pub fn arg_value(invocation: &StageInvocation, key: &str) -> Option<PathBuf> {
    let prefix = format!("--{}=", key);
    invocation
        .args
        .iter()
        .find_map(|a| a.strip_prefix(&prefix).map(PathBuf::from))
}

//! Removing containers left behind by interrupted test runs.

use std::ffi::OsString;
use std::io::{self, BufRead, Write};

use clap::{Args, CommandFactory, FromArgMatches, Parser};

use crate::container::{ContainerRuntime, ContainerState, DockerRuntime};
use crate::errors::HarnessResult;

pub const DEFAULT_DESCRIPTION: &str = "Cleanup stray integration test containers";

#[derive(Debug, Clone, Default, Args)]
pub struct CleanupArgs {
    /// Remove without asking
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Container name prefixes to look for [default: the runner's prefixes]
    #[arg(long, value_name = "PREFIX", num_args = 1..)]
    pub filter: Vec<String>,

    /// Only containers whose name ends with this job id
    #[arg(short = 'j', long, value_name = "ID")]
    pub job_id: Option<String>,
}

#[derive(Debug, Parser)]
struct CleanupCli {
    #[command(flatten)]
    args: CleanupArgs,
}

/// A stray-container cleanup command with its own default name prefixes.
#[derive(Debug, Clone)]
pub struct Cleanup {
    description: String,
    default_prefixes: Vec<String>,
}

impl Default for Cleanup {
    fn default() -> Self {
        Self::new(DEFAULT_DESCRIPTION, Vec::<String>::new())
    }
}

impl Cleanup {
    pub fn new<I, S>(description: impl Into<String>, default_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            description: description.into(),
            default_prefixes: default_prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn default_prefixes(&self) -> &[String] {
        &self.default_prefixes
    }

    pub fn parse_args<I, T>(&self, args: I) -> Result<CleanupArgs, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = CleanupCli::command()
            .about(self.description.clone())
            .try_get_matches_from(args)?;
        Ok(CleanupCli::from_arg_matches(&matches)?.args)
    }

    /// Running containers that start with one of the prefixes and, with a job id, end with it.
    pub fn matching(&self, runtime: &dyn ContainerRuntime, args: &CleanupArgs) -> HarnessResult<Vec<ContainerState>> {
        let prefixes = if args.filter.is_empty() { &self.default_prefixes } else { &args.filter };
        let job_id = args.job_id.as_deref().filter(|id| !id.is_empty());

        let mut found: Vec<ContainerState> = runtime
            .list_containers()?
            .into_iter()
            .filter(|c| prefixes.iter().any(|p| c.name.starts_with(p.as_str())))
            .filter(|c| job_id.is_none_or(|id| c.name.ends_with(id)))
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    /// List, confirm and stop the matching containers; returns how many were stopped.
    #[tracing::instrument(skip_all)]
    pub fn execute<R: BufRead>(
        &self,
        runtime: &dyn ContainerRuntime,
        args: &CleanupArgs,
        input: &mut R,
    ) -> HarnessResult<usize> {
        let found = self.matching(runtime, args)?;
        if found.is_empty() {
            println!("No containers matching filter/job-id");
            return Ok(0);
        }

        println!("{}", removal_listing(&found));
        if !args.force && !yes_or_no(input, "Remove the above containers")? {
            println!("No containers removed");
            return Ok(0);
        }

        let mut stopped = 0;
        for container in &found {
            println!("Stopping {}", container.name);
            match runtime.stop(&container.name) {
                Ok(()) => stopped += 1,
                Err(e) => tracing::warn!("Failed to stop '{}': {}", container.name, e),
            }
        }
        Ok(stopped)
    }

    /// Parse `args`, connect to Docker and clean up interactively; returns the exit code.
    pub fn run<I, T>(&self, args: I) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let args = match self.parse_args(args) {
            Ok(args) => args,
            Err(e) => {
                let _ = e.print();
                return e.exit_code();
            }
        };
        let outcome = DockerRuntime::connect()
            .and_then(|runtime| self.execute(&runtime, &args, &mut io::stdin().lock()));
        match outcome {
            Ok(_) => 0,
            Err(e) => {
                eprintln!("error: {e}");
                1
            }
        }
    }
}

fn removal_listing(found: &[ContainerState]) -> String {
    let mut text = String::from("Container to be removed:");
    for container in found {
        text.push_str(&format!("\n    {} ({}) {}", container.name, container.short_id(), container.image_tags.join(", ")));
    }
    text
}

/// Ask until the answer starts with `y` or `n`. End of input counts as no.
pub fn yes_or_no<R: BufRead>(input: &mut R, question: &str) -> HarnessResult<bool> {
    let mut prompt = question.to_string();
    loop {
        print!("{prompt} (y/n): ");
        io::stdout().flush()?;

        let mut reply = String::new();
        if input.read_line(&mut reply)? == 0 {
            return Ok(false);
        }
        match reply.trim().to_lowercase().chars().next() {
            Some('y') => return Ok(true),
            Some('n') => return Ok(false),
            _ => prompt = "Please enter".to_string(),
        }
    }
}

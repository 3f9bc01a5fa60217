//! Interactive shell.
//!
//! Reads commands from stdin one line at a time and drives the transfer
//! coordinator. The shell itself is the "single mutual-exclusion token"
//! the concurrency design calls for: it awaits the coordinator
//! synchronously, so the next prompt never prints before the previous
//! batch's connections have all closed.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::client::coordinator::{self, Endpoint, TransferMode};
use crate::client::pipeline::TransferResult;

pub struct Shell {
    endpoint: Endpoint,
    climit: Option<usize>,
    mode: TransferMode,
    cwd: PathBuf,
}

impl Shell {
    pub fn new(host: String, port: u16, climit: Option<usize>) -> Self {
        Self {
            endpoint: Endpoint { host, port },
            climit,
            mode: TransferMode::Single,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Runs `getall` once in the shell's configured mode, for `-run <mode>`.
    pub async fn run_once(&mut self, mode: TransferMode) -> Result<()> {
        self.mode = mode;
        self.getall().await
    }

    /// Drives the `stdin`-backed REPL until `quit`/`exit` or EOF.
    pub async fn run_interactive(&mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        print_prompt(self);

        while let Some(line) = lines.next_line().await.context("reading from stdin")? {
            let line = line.trim();
            if !line.is_empty() {
                if let Err(e) = self.dispatch(line).await {
                    println!("error: {e:#}");
                }
            }
            if line == "quit" || line == "exit" {
                break;
            }
            print_prompt(self);
        }
        Ok(())
    }

    async fn dispatch(&mut self, line: &str) -> Result<()> {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else { return Ok(()) };
        let args: Vec<&str> = parts.collect();

        match cmd {
            "quit" | "exit" => Ok(()),
            "host" => self.set_host(&args),
            "port" => self.set_port(&args),
            "climit" => self.set_climit(&args),
            "mode" => self.set_mode(&args),
            "get" => self.get(&args).await,
            "getall" => self.getall().await,
            "put" => self.put(&args).await,
            "ls" => self.ls(),
            "rls" => self.rls().await,
            "help" => self.help(&args),
            other => {
                println!("unknown command: {other} (try `help`)");
                Ok(())
            }
        }
    }

    fn set_host(&mut self, args: &[&str]) -> Result<()> {
        match args.first() {
            Some(host) => {
                self.endpoint.host = host.to_string();
                Ok(())
            }
            None => {
                println!("host: {}", self.endpoint.host);
                Ok(())
            }
        }
    }

    fn set_port(&mut self, args: &[&str]) -> Result<()> {
        match args.first() {
            Some(port) => {
                self.endpoint.port = port.parse().context("port must be a number")?;
                Ok(())
            }
            None => {
                println!("port: {}", self.endpoint.port);
                Ok(())
            }
        }
    }

    fn set_climit(&mut self, args: &[&str]) -> Result<()> {
        match args.first() {
            Some(n) => {
                self.climit = Some(n.parse().context("climit must be a number")?);
                Ok(())
            }
            None => {
                println!(
                    "climit: {}",
                    self.climit
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "unbounded".to_string())
                );
                Ok(())
            }
        }
    }

    fn set_mode(&mut self, args: &[&str]) -> Result<()> {
        match args.first() {
            Some(&"list") => {
                println!("single parallel persistent pipelined");
                Ok(())
            }
            Some(name) => match TransferMode::parse(name) {
                Some(mode) => {
                    self.mode = mode;
                    Ok(())
                }
                None => anyhow::bail!("unknown mode: {name}"),
            },
            None => {
                println!("mode: {}", self.mode.as_str());
                Ok(())
            }
        }
    }

    async fn get(&mut self, args: &[&str]) -> Result<()> {
        if args.is_empty() {
            anyhow::bail!("usage: get <file> ...");
        }
        let names: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let reports = coordinator::get_files(
            &self.endpoint,
            names,
            self.cwd.clone(),
            self.mode,
            self.climit,
        )
        .await
        .context("GET batch failed")?;
        print_reports(&reports);
        Ok(())
    }

    async fn getall(&mut self) -> Result<()> {
        let names = coordinator::get_index(&self.endpoint)
            .await
            .context("fetching index")?;
        if names.is_empty() {
            println!("(index is empty)");
            return Ok(());
        }
        let reports = coordinator::get_files(
            &self.endpoint,
            names,
            self.cwd.clone(),
            self.mode,
            self.climit,
        )
        .await
        .context("GET batch failed")?;
        print_reports(&reports);
        Ok(())
    }

    async fn put(&mut self, args: &[&str]) -> Result<()> {
        if args.is_empty() {
            anyhow::bail!("usage: put <file> ...");
        }
        let paths: Vec<PathBuf> = args.iter().map(|s| self.cwd.join(s)).collect();
        let reports = coordinator::put_files(&self.endpoint, paths, self.mode, self.climit)
            .await
            .context("PUT batch failed")?;
        print_reports(&reports);
        Ok(())
    }

    fn ls(&self) -> Result<()> {
        let mut entries: Vec<String> = std::fs::read_dir(&self.cwd)
            .context("reading local directory")?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with('.'))
            .collect();
        entries.sort();
        for name in entries {
            println!("{name}");
        }
        Ok(())
    }

    async fn rls(&self) -> Result<()> {
        let names = coordinator::get_index(&self.endpoint)
            .await
            .context("fetching index")?;
        for name in names {
            println!("{name}");
        }
        Ok(())
    }

    fn help(&self, args: &[&str]) -> Result<()> {
        let topic = args.first().copied();
        let text = match topic {
            Some("get") => "get <file> ... - download files in the current transfer mode",
            Some("put") => "put <file> ... - upload files in the current transfer mode",
            Some("mode") => "mode [single|parallel|persistent|pipelined|list] - show or set transfer mode",
            Some("getall") => "getall - fetch the remote index, then download everything listed",
            Some("ls") => "ls - list local files (excludes dotfiles)",
            Some("rls") => "rls - list remote files (excludes dotfiles)",
            Some("host") | Some("port") | Some("climit") => "show or set a connection parameter",
            _ => {
                "commands: host, port, climit, mode, get, getall, put, ls, rls, help, quit/exit"
            }
        };
        println!("{text}");
        Ok(())
    }
}

fn print_prompt(shell: &Shell) {
    print!("{}:{} [{}]> ", shell.endpoint.host, shell.endpoint.port, shell.mode.as_str());
    use std::io::Write;
    let _ = std::io::stdout().flush();
}

fn print_reports(reports: &[coordinator::TransferReport]) {
    for report in reports {
        let status = match report.result {
            TransferResult::Downloaded => "OK",
            TransferResult::Uploaded => "OK",
            TransferResult::NotFound => "NOTFOUND",
            TransferResult::ReadErr => "READERR",
            TransferResult::WrErr => "WRERR",
            TransferResult::HashErr => "HASHERR",
            TransferResult::ReqErr => "REQERR",
        };
        println!("{status}\t{}", report.name);
    }
}

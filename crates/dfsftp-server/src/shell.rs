//! Line-oriented driver for one session.
//!
//! Stands where a protocol engine would: each command maps onto the view
//! operation the matching protocol verb uses.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dfsftp_kernel::{EntryKind, SessionView, VirtualEntry};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const HELP: &str = "\
commands:
  pwd                      print the working directory
  cd <path>                change directory
  ls [path]                list a directory
  stat <path>              show one entry
  mkdir <path>             create a directory
  rm <path>                delete a file or directory
  mv <from> <to>           rename
  cat <path> [offset]      print a file
  put <path> <text>        write a file
  append <path> <text>     append to a file
  help                     this text
  quit                     end the session";

/// What a command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Quit,
}

impl Reply {
    fn ok() -> Self {
        Reply::Text("ok".to_string())
    }

    fn failed(what: &str, path: &str) -> Self {
        Reply::Text(format!("{what} failed: {path}"))
    }
}

pub struct Shell {
    view: SessionView,
}

impl Shell {
    pub fn new(view: SessionView) -> Self {
        Self { view }
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    /// Read commands until end of input or `quit`, writing replies.
    pub async fn run<R, W>(mut self, input: R, output: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await.context("Failed to read command")? {
            let reply = match self.execute(&line).await {
                Ok(reply) => reply,
                Err(e) => Reply::Text(format!("error: {e:#}")),
            };
            match reply {
                Reply::Quit => break,
                Reply::Text(text) if text.is_empty() => {}
                Reply::Text(text) => {
                    output.write_all(text.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                }
            }
            output.flush().await?;
        }
        self.view.dispose();
        Ok(())
    }

    /// Run one command line.
    pub async fn execute(&mut self, line: &str) -> Result<Reply> {
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        tracing::debug!(command, args = rest, "shell command");

        let reply = match command {
            "" => Reply::Text(String::new()),
            "help" => Reply::Text(HELP.to_string()),
            "quit" | "exit" => Reply::Quit,
            "pwd" => Reply::Text(self.view.current_dir().to_string()),
            "cd" => {
                self.view.change_directory(rest).await;
                Reply::Text(self.view.current_dir().to_string())
            }
            "ls" => self.list(rest).await?,
            "stat" => self.stat(rest).await?,
            "mkdir" => {
                let entry = self.view.lookup(required(rest, "mkdir <path>")?).await?;
                if entry.make_directory().await {
                    Reply::ok()
                } else {
                    Reply::failed("mkdir", entry.path().as_str())
                }
            }
            "rm" => {
                let entry = self.view.lookup(required(rest, "rm <path>")?).await?;
                if !entry.exists() {
                    Reply::Text(format!("no such file: {}", entry.path()))
                } else if entry.delete().await {
                    Reply::ok()
                } else {
                    Reply::failed("rm", entry.path().as_str())
                }
            }
            "mv" => {
                let (from, to) = two_args(rest, "mv <from> <to>")?;
                let source = self.view.lookup(from).await?;
                let target = self.view.lookup(to).await?;
                if source.move_to(&target).await {
                    Reply::ok()
                } else {
                    Reply::failed("mv", source.path().as_str())
                }
            }
            "cat" => self.cat(rest).await?,
            "put" => self.write(rest, false).await?,
            "append" => self.write(rest, true).await?,
            other => Reply::Text(format!("unknown command: {other} (try help)")),
        };
        Ok(reply)
    }

    async fn list(&self, rest: &str) -> Result<Reply> {
        let dir = self.view.lookup(rest).await?;
        let entries = match dir.kind() {
            EntryKind::Absent => return Ok(Reply::Text(format!("no such directory: {}", dir.path()))),
            EntryKind::File => vec![dir],
            EntryKind::Directory => dir.list_children().await?,
        };
        let mut lines = Vec::with_capacity(entries.len());
        for entry in &entries {
            lines.push(long_format(entry).await);
        }
        Ok(Reply::Text(lines.join("\n")))
    }

    async fn stat(&self, rest: &str) -> Result<Reply> {
        let entry = self.view.lookup(rest).await?;
        if !entry.exists() {
            return Ok(Reply::Text(format!("no such file: {}", entry.path())));
        }
        let kind = if entry.is_directory() { "directory" } else { "file" };
        let text = format!(
            "path: {}\nkind: {kind}\nsize: {}\nowner: {}\ngroup: {}\nmode: {}\nreadable: {}\nwritable: {}",
            entry.path(),
            entry.size().unwrap_or(0),
            entry.owner().await.unwrap_or_default(),
            entry.group().await.unwrap_or_default(),
            entry.permissions().map(|p| p.to_string()).unwrap_or_default(),
            entry.is_readable().await,
            entry.is_writable().await,
        );
        Ok(Reply::Text(text))
    }

    async fn cat(&self, rest: &str) -> Result<Reply> {
        let (path, offset) = match rest.split_once(char::is_whitespace) {
            Some((path, offset)) => (
                path,
                offset
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("bad offset {offset:?}"))?,
            ),
            None => (required(rest, "cat <path> [offset]")?, 0),
        };
        let mut entry = self.view.lookup(path).await?;
        if !entry.is_file() {
            return Ok(Reply::Text(format!("not a file: {}", entry.path())));
        }
        let mut stream = entry.open_read(offset).await?;
        let mut data = Vec::new();
        stream.read_to_end(&mut data).await?;
        Ok(Reply::Text(String::from_utf8_lossy(&data).into_owned()))
    }

    async fn write(&self, rest: &str, append: bool) -> Result<Reply> {
        let usage = if append { "append <path> <text>" } else { "put <path> <text>" };
        let (path, text) = match rest.split_once(char::is_whitespace) {
            Some((path, text)) => (path, text.trim_start()),
            None => (required(rest, usage)?, ""),
        };
        let entry = self.view.lookup(path).await?;
        if entry.is_directory() {
            return Ok(Reply::Text(format!("is a directory: {}", entry.path())));
        }
        let offset = if append { entry.size().unwrap_or(0) } else { 0 };
        let mut stream = entry.open_write(offset).await?;
        stream.write_all(text.as_bytes()).await?;
        stream.shutdown().await?;
        Ok(Reply::Text(format!("wrote {} bytes", text.len())))
    }
}

fn required<'a>(arg: &'a str, usage: &str) -> Result<&'a str> {
    if arg.is_empty() {
        anyhow::bail!("usage: {usage}");
    }
    Ok(arg)
}

fn two_args<'a>(rest: &'a str, usage: &str) -> Result<(&'a str, &'a str)> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => anyhow::bail!("usage: {usage}"),
    }
}

/// `drwxr-xr-x   3 owner group     size Mon DD HH:MM name`
async fn long_format(entry: &VirtualEntry) -> String {
    let kind = if entry.is_directory() { 'd' } else { '-' };
    let mode = entry.permissions().map(|p| p.to_string()).unwrap_or_default();
    let mtime = entry
        .modified()
        .map(|t| DateTime::<Utc>::from(t).format("%b %e %H:%M").to_string())
        .unwrap_or_default();
    format!(
        "{kind}{mode} {:>3} {:<8} {:<8} {:>8} {mtime} {}",
        entry.link_count(),
        entry.owner().await.unwrap_or_default(),
        entry.group().await.unwrap_or_default(),
        entry.size().unwrap_or(0),
        entry.name(),
    )
}

//! Detached helper processes (browsers, mail composers)

use std::io;
use std::process::{Child, Command, Stdio};

use dapi_ipc::Mail;
use tracing::{debug, info, warn};

/// Spawns helpers and reaps them once they exit
#[derive(Default)]
pub struct Launcher {
    children: Vec<Child>,
}

impl Launcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `program` with `args`; does not wait for it
    pub fn spawn<I, A>(&mut self, program: &str, args: I) -> io::Result<u32>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<std::ffi::OsStr>,
    {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()?;
        let pid = child.id();
        info!("Spawned {} (pid {})", program, pid);
        self.children.push(child);
        Ok(pid)
    }

    /// Collect children that have exited
    pub fn reap(&mut self) {
        self.children.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                debug!("Helper {} exited: {}", child.id(), status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!("Failed to query helper {}: {}", child.id(), e);
                false
            }
        });
    }

    /// Helpers still running
    #[cfg(test)]
    pub fn running(&self) -> usize {
        self.children.len()
    }
}

/// Split a configured command line into program and leading arguments
pub fn split_command(command: &str) -> Option<(&str, Vec<&str>)> {
    let mut words = command.split_whitespace();
    let program = words.next()?;
    Some((program, words.collect()))
}

/// Arguments for an xdg-email style composer
pub fn mail_arguments(mail: &Mail) -> Vec<String> {
    let mut args = Vec::new();
    for (flag, value) in [
        ("--subject", &mail.subject),
        ("--body", &mail.body),
        ("--cc", &mail.cc),
        ("--bcc", &mail.bcc),
    ] {
        if !value.is_empty() {
            args.push(flag.to_string());
            args.push(value.clone());
        }
    }
    for attachment in &mail.attachments {
        args.push("--attach".to_string());
        args.push(attachment.clone());
    }
    if !mail.to.is_empty() {
        args.push(mail.to.clone());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command("firefox --new-tab"),
            Some(("firefox", vec!["--new-tab"]))
        );
        assert_eq!(split_command("   "), None);
    }

    #[test]
    fn test_mail_arguments_skip_empty_fields() {
        let mail = Mail {
            subject: "Hello".into(),
            to: "someone@example.com".into(),
            attachments: vec!["/tmp/a.pdf".into(), "/tmp/b.png".into()],
            ..Default::default()
        };
        assert_eq!(
            mail_arguments(&mail),
            vec![
                "--subject",
                "Hello",
                "--attach",
                "/tmp/a.pdf",
                "--attach",
                "/tmp/b.png",
                "someone@example.com",
            ]
        );
    }

    #[test]
    fn test_mail_arguments_empty() {
        assert!(mail_arguments(&Mail::default()).is_empty());
    }

    #[test]
    fn test_spawn_and_reap() {
        let mut launcher = Launcher::new();
        launcher.spawn("true", std::iter::empty::<&str>()).unwrap();
        assert_eq!(launcher.running(), 1);

        for _ in 0..100 {
            launcher.reap();
            if launcher.running() == 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(launcher.running(), 0);
    }

    #[test]
    fn test_spawn_missing_program() {
        let mut launcher = Launcher::new();
        let err = launcher
            .spawn("dapi-no-such-program", ["x"])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(launcher.running(), 0);
    }
}

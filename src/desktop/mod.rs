//! Desktop side effects behind the protocol handlers

pub mod files;
pub mod launch;

use std::ffi::OsStr;

use dapi_ipc::Mail;
use tracing::{debug, warn};

use crate::config::Config;
use crate::x11::Dpms;
use launch::Launcher;

/// What the handlers may ask of the desktop
pub trait Desktop {
    /// Open `url` in a browser; the bytes are passed on unchanged
    fn open_url(&mut self, url: &OsStr) -> bool;

    /// Open a mail composer
    fn mail_to(&mut self, mail: &Mail) -> bool;

    /// Suspend or resume the screensaver for the whole session
    fn set_screensaver_suspended(&mut self, suspended: bool) -> bool;

    /// Dialog button order
    fn button_order(&self) -> i32;

    /// Periodic housekeeping, run on every loop wake
    fn tick(&mut self) {}
}

/// Desktop backed by helper processes and the X server
pub struct SystemDesktop {
    launcher: Launcher,
    browsers: Vec<String>,
    mail_command: String,
    button_order: i32,
    dpms: Option<Dpms>,
}

impl SystemDesktop {
    pub fn new(config: &Config, dpms: Option<Dpms>) -> Self {
        Self {
            launcher: Launcher::new(),
            browsers: config.browser.commands.clone(),
            mail_command: config.mail.command.clone(),
            button_order: config.desktop.button_order,
            dpms,
        }
    }
}

impl Desktop for SystemDesktop {
    fn open_url(&mut self, url: &OsStr) -> bool {
        for command in &self.browsers {
            let Some((program, args)) = launch::split_command(command) else {
                continue;
            };
            let args = args.into_iter().map(OsStr::new).chain(std::iter::once(url));
            match self.launcher.spawn(program, args) {
                Ok(_) => return true,
                Err(e) => debug!("Browser {} unavailable: {}", program, e),
            }
        }
        warn!("No browser could open {}", url.to_string_lossy());
        false
    }

    fn mail_to(&mut self, mail: &Mail) -> bool {
        let Some((program, args)) = launch::split_command(&self.mail_command) else {
            warn!("No mail command configured");
            return false;
        };
        let mail_args = launch::mail_arguments(mail);
        let all = args
            .iter()
            .map(|a| a.to_string())
            .chain(mail_args);
        match self.launcher.spawn(program, all) {
            Ok(_) => true,
            Err(e) => {
                warn!("Failed to start mail composer {}: {}", program, e);
                false
            }
        }
    }

    fn set_screensaver_suspended(&mut self, suspended: bool) -> bool {
        let Some(dpms) = &self.dpms else {
            debug!("No X display, cannot control the screensaver");
            return false;
        };
        dpms.set_suspended(suspended).unwrap_or_else(|e| {
            warn!("DPMS request failed: {}", e);
            false
        })
    }

    fn button_order(&self) -> i32 {
        self.button_order
    }

    fn tick(&mut self) {
        self.launcher.reap();
    }
}

/// Records requests instead of acting on them
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FakeDesktop {
    pub opened: Vec<String>,
    pub mails: Vec<Mail>,
    /// Every screensaver state requested, in order
    pub screensaver: Vec<bool>,
    pub ticks: usize,
    pub fail: bool,
}

#[cfg(test)]
impl Desktop for FakeDesktop {
    fn open_url(&mut self, url: &OsStr) -> bool {
        self.opened.push(url.to_string_lossy().into_owned());
        !self.fail
    }

    fn mail_to(&mut self, mail: &Mail) -> bool {
        self.mails.push(mail.clone());
        !self.fail
    }

    fn set_screensaver_suspended(&mut self, suspended: bool) -> bool {
        self.screensaver.push(suspended);
        !self.fail
    }

    fn button_order(&self) -> i32 {
        1
    }

    fn tick(&mut self) {
        self.ticks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop(browsers: &[&str]) -> SystemDesktop {
        let mut config = Config::default();
        config.browser.commands = browsers.iter().map(|b| b.to_string()).collect();
        config.mail.command = "true".into();
        config.desktop.button_order = 2;
        SystemDesktop::new(&config, None)
    }

    #[test]
    fn test_open_url_falls_back_to_next_browser() {
        let mut desktop = desktop(&["dapi-missing-browser", "true --ignored"]);
        assert!(desktop.open_url(OsStr::new("http://example.com")));
        assert_eq!(desktop.launcher.running(), 1);
    }

    #[test]
    fn test_open_url_without_browser() {
        let mut desktop = desktop(&["dapi-missing-browser", ""]);
        assert!(!desktop.open_url(OsStr::new("http://example.com")));
    }

    #[test]
    fn test_open_url_passes_raw_bytes() {
        use std::os::unix::ffi::OsStrExt;

        let mut desktop = desktop(&["true"]);
        assert!(desktop.open_url(OsStr::from_bytes(b"/tmp/\xff")));
        assert_eq!(desktop.launcher.running(), 1);
    }

    #[test]
    fn test_mail_to_spawns_composer() {
        let mut desktop = desktop(&[]);
        let mail = Mail {
            to: "a@example.com".into(),
            ..Default::default()
        };
        assert!(desktop.mail_to(&mail));
    }

    #[test]
    fn test_screensaver_without_display() {
        let mut desktop = desktop(&[]);
        assert!(!desktop.set_screensaver_suspended(true));
        assert_eq!(desktop.button_order(), 2);
    }
}

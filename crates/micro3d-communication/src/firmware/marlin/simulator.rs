//! Simulated Marlin controller
//!
//! [`VirtualStage`] answers the handful of commands the stage driver uses the way
//! a Marlin 2.x board does. Plug it into a
//! [`VirtualPort`](crate::communication::virtual_port::VirtualPort) to run
//! without hardware.

use crate::communication::virtual_port::VirtualDevice;
use micro3d_core::constants::COMPLETION_TOKEN;
use micro3d_core::Position;

/// Steps per millimeter reported in the `Count` fields of `M114`
const STEPS_PER_MM: [f64; 3] = [80.0, 80.0, 100.0];

/// In-memory Marlin board driving an XYZ stage
#[derive(Debug, Clone)]
pub struct VirtualStage {
    position: Position,
    banner: bool,
    silent: bool,
}

impl Default for VirtualStage {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualStage {
    /// Stage at the origin that prints a boot banner
    pub fn new() -> Self {
        Self {
            position: Position::default(),
            banner: true,
            silent: false,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn without_banner(mut self) -> Self {
        self.banner = false;
        self
    }

    /// Receive commands but never answer them
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// `M114` report for the current position
    pub fn position_report(&self) -> String {
        let p = self.position;
        format!(
            "X:{:.2} Y:{:.2} Z:{:.2} E:0.00 Count X:{} Y:{} Z:{}",
            p.x,
            p.y,
            p.z,
            (p.x * STEPS_PER_MM[0]).round() as i64,
            (p.y * STEPS_PER_MM[1]).round() as i64,
            (p.z * STEPS_PER_MM[2]).round() as i64,
        )
    }

    fn apply_move(&mut self, words: &[&str]) -> Option<String> {
        let mut next = self.position;
        for word in words {
            let mut chars = word.chars();
            let letter = chars.next();
            let Ok(value) = chars.as_str().parse::<f64>() else {
                return Some(format!("echo:Invalid parameter: \"{}\"", word));
            };
            match letter {
                Some('X') => next.x = value,
                Some('Y') => next.y = value,
                Some('Z') => next.z = value,
                _ => {}
            }
        }
        self.position = next;
        None
    }
}

impl VirtualDevice for VirtualStage {
    fn boot_banner(&mut self) -> Vec<String> {
        if !self.banner {
            return Vec::new();
        }
        vec![
            "start".to_string(),
            "echo:Marlin 2.1.2.1".to_string(),
            "echo: Last Updated: 2023-05-30 | Author: (none, default config)".to_string(),
            "echo:SD card ok".to_string(),
        ]
    }

    fn on_line(&mut self, line: &str) -> Vec<String> {
        if self.silent {
            return Vec::new();
        }
        let upper = line.trim().to_uppercase();
        let mut words = upper.split_whitespace();
        let Some(code) = words.next() else {
            return Vec::new();
        };
        let args: Vec<&str> = words.filter(|w| !w.is_empty()).collect();

        let mut reply = Vec::new();
        match code {
            "G0" | "G1" => {
                if let Some(echo) = self.apply_move(&args) {
                    reply.push(echo);
                }
            }
            "G28" => {
                reply.push("echo:busy: processing".to_string());
                self.position = Position::default();
            }
            "M114" => reply.push(self.position_report()),
            _ if code.starts_with('M') || code.starts_with('G') => {}
            _ => reply.push(format!("echo:Unknown command: \"{}\"", line.trim())),
        }
        reply.push(COMPLETION_TOKEN.to_string());
        reply
    }
}

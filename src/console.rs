//! User-facing command layer
//!
//! `Console` turns framework results into reporter output. Every command
//! returns nothing: failures are reported once through the [`Reporter`] and
//! counted, never propagated.

use crate::framework::{Framework, SlotInfo};
use serde_json::Value;
use std::io::{self, Write};
use tracing::{error, info};

/// Sink for command results.
pub trait Reporter {
    fn success(&mut self, message: &str);

    fn fail(&mut self, message: &str);

    fn info(&mut self, message: &str);

    fn table(&mut self, title: &str, headers: &[&str], rows: &[Vec<String>]);
}

/// Reporter printing to standard output.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    fn emit(&self, line: &str) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{line}") {
            error!("Failed to write to stdout: {}", e);
        }
    }
}

impl Reporter for ConsoleReporter {
    fn success(&mut self, message: &str) {
        self.emit(&format!("[+] {message}"));
    }

    fn fail(&mut self, message: &str) {
        self.emit(&format!("[x] {message}"));
    }

    fn info(&mut self, message: &str) {
        self.emit(&format!("[*] {message}"));
    }

    fn table(&mut self, title: &str, headers: &[&str], rows: &[Vec<String>]) {
        self.emit(&render_table(title, headers, rows));
    }
}

/// Plain-text table with a title line and padded columns.
pub fn render_table(title: &str, headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (column, cell) in row.iter().enumerate() {
            let width = cell.chars().count();
            match widths.get_mut(column) {
                Some(current) => *current = (*current).max(width),
                None => widths.push(width),
            }
        }
    }

    let border = format!(
        "+{}+",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );
    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(column, &width)| {
                let cell = cells.get(column).copied().unwrap_or("");
                format!(" {cell:<width$} ")
            })
            .collect();
        format!("|{}|", padded.join("|"))
    };

    let mut out = vec![format!("== {title} =="), border.clone()];
    out.push(line(headers.to_vec()));
    out.push(border.clone());
    for row in rows {
        out.push(line(row.iter().map(String::as_str).collect()));
    }
    out.push(border);
    out.join("\n")
}

pub struct Console<R: Reporter> {
    framework: Framework,
    reporter: R,
    failures: usize,
}

impl<R: Reporter> Console<R> {
    pub fn new(framework: Framework, reporter: R) -> Self {
        Self {
            framework,
            reporter,
            failures: 0,
        }
    }

    pub fn framework(&self) -> &Framework {
        &self.framework
    }

    pub fn framework_mut(&mut self) -> &mut Framework {
        &mut self.framework
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Number of commands that reported a failure so far
    pub fn failures(&self) -> usize {
        self.failures
    }

    fn fail(&mut self, message: &str) {
        self.failures += 1;
        self.reporter.fail(message);
    }

    pub fn load(&mut self, expression: &str) {
        match self.framework.load(expression) {
            Ok(pipeline) => {
                let loaded: Vec<String> = pipeline
                    .slots()
                    .iter()
                    .map(|slot| {
                        if slot.is_alias() {
                            format!("Shortcut {} loaded!", slot.display_name())
                        } else {
                            format!("Unit {} loaded!", slot.display_name())
                        }
                    })
                    .collect();
                for message in loaded {
                    self.reporter.info(&message);
                }
            }
            Err(e) => self.fail(&e.to_string()),
        }
    }

    pub fn set(&mut self, name: &str, value: &str) {
        if let Err(e) = self
            .framework
            .set_parameter(name, Value::String(value.to_string()))
        {
            self.fail(&e.to_string());
        }
    }

    pub fn run(&mut self) {
        if self.framework.pipeline().is_empty() {
            self.fail("No unit loaded!");
            return;
        }

        match self.framework.run() {
            Ok(carried) => {
                info!(outputs = carried.len(), "Run finished");
                self.reporter.success("Execution completed");
            }
            Err(e) => self.fail(&e.to_string()),
        }
    }

    pub fn showargs(&mut self) {
        for slot in self.framework.list_parameters() {
            let rows: Vec<Vec<String>> = slot
                .rows
                .into_iter()
                .map(|(name, value)| vec![name, value])
                .collect();
            self.reporter.table(&slot.slot, &["Name", "Value"], &rows);
        }
    }

    pub fn info(&mut self) {
        for slot in self.framework.info() {
            match slot {
                SlotInfo::Unit {
                    slot,
                    name,
                    descriptor,
                } => self.reporter.table(
                    &slot,
                    &["Name", "Technology", "Type", "Description"],
                    &[vec![
                        name,
                        descriptor.technology,
                        descriptor.unit_type,
                        descriptor.description,
                    ]],
                ),
                SlotInfo::Shortcut { slot, summary } => self.reporter.table(
                    &format!("{slot} (shortcut)"),
                    &["Name", "Units", "Description"],
                    &[vec![summary.name, summary.units, summary.description]],
                ),
            }
        }
    }

    pub fn list(&mut self, pattern: &str) {
        let groups = self.framework.list_units(pattern);
        if groups.is_empty() {
            self.fail("No unit found!");
            return;
        }
        for group in groups {
            let rows: Vec<Vec<String>> = group
                .units
                .into_iter()
                .map(|unit| vec![unit.name, unit.unit_type, unit.description])
                .collect();
            self.reporter
                .table(&group.technology, &["Name", "Type", "Description"], &rows);
        }
    }

    pub fn shortcuts(&mut self, pattern: &str) {
        let shortcuts = self.framework.list_shortcuts(pattern);
        if shortcuts.is_empty() {
            self.fail("No shortcut found!");
            return;
        }
        let rows: Vec<Vec<String>> = shortcuts
            .into_iter()
            .map(|s| vec![s.name, s.units, s.description])
            .collect();
        self.reporter
            .table("Shortcuts", &["Name", "Units", "Description"], &rows);
    }

    pub fn tasks(&mut self, pattern: &str) {
        let rows: Vec<Vec<String>> = self
            .framework
            .tasks_mut()
            .list(pattern)
            .iter()
            .map(|task| task.to_row())
            .collect();
        self.reporter.table(
            "Background Tasks",
            &["PID", "Name", "State", "Output"],
            &rows,
        );
    }

    pub fn start(&mut self, task: &str) {
        match self.framework.tasks_mut().try_start_task(task) {
            Ok(pid) => self
                .reporter
                .success(&format!("Task {task} started (pid {pid})")),
            Err(e) => self.fail(&e.to_string()),
        }
    }

    pub fn stop(&mut self, task: &str) {
        match self.framework.tasks_mut().try_stop_task(task) {
            Ok(()) => self.reporter.success(&format!("Task {task} stopped")),
            Err(e) => self.fail(&e.to_string()),
        }
    }

    pub fn restart(&mut self, task: &str) {
        match self.framework.tasks_mut().try_restart_task(task) {
            Ok(pid) => self
                .reporter
                .success(&format!("Task {task} restarted (pid {pid})")),
            Err(e) => self.fail(&e.to_string()),
        }
    }

    /// Show all settings, one setting, or set one and persist it.
    pub fn config(&mut self, key: Option<&str>, value: Option<&str>) {
        match (key, value) {
            (None, _) => {
                let settings = match toml::Value::try_from(&self.framework.config().settings) {
                    Ok(toml::Value::Table(table)) => table,
                    Ok(_) => return,
                    Err(e) => {
                        self.fail(&format!("Failed to read settings: {e}"));
                        return;
                    }
                };
                let rows: Vec<Vec<String>> = settings
                    .iter()
                    .map(|(key, value)| vec![key.clone(), display_setting(value)])
                    .collect();
                self.reporter.table("Settings", &["Key", "Value"], &rows);
            }
            (Some(key), None) => match self.framework.config().get(key) {
                Some(value) => self
                    .reporter
                    .info(&format!("{key}: {}", display_setting(&value))),
                None => self.fail(&format!("Unknown setting: {key}")),
            },
            (Some(key), Some(value)) => match self.framework.config_mut().set(key, value) {
                Ok(()) => self.reporter.success(&format!("Set {key} to {value}")),
                Err(e) => self.fail(&e.to_string()),
            },
        }
    }

    /// Stop tasks and devices; the console stays usable afterwards.
    pub fn exit(&mut self) {
        self.framework.exit();
        self.reporter.info("wirelab terminated!");
    }

    pub fn into_parts(self) -> (Framework, R) {
        (self.framework, self.reporter)
    }
}

fn display_setting(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_table_pads_columns() {
        let table = render_table(
            "Shortcuts",
            &["Name", "Units"],
            &[vec!["sniff".into(), "ble_discover|ble_sniff".into()]],
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "== Shortcuts ==");
        assert_eq!(lines[2], "| Name  | Units                  |");
        assert_eq!(lines[4], "| sniff | ble_discover|ble_sniff |");
        assert_eq!(lines[1].len(), lines[2].len());
    }

    #[test]
    fn test_render_table_without_rows() {
        let table = render_table("Background Tasks", &["PID", "Name"], &[]);
        assert_eq!(table.lines().count(), 5);
    }

    #[test]
    fn test_display_setting() {
        assert_eq!(display_setting(&toml::Value::String("hci0".into())), "hci0");
        assert_eq!(display_setting(&toml::Value::Integer(3)), "3");
        assert_eq!(display_setting(&toml::Value::Boolean(false)), "false");
    }
}

use tasker_core::PortSet;

use super::Context;
use crate::output;

pub fn run(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let ports = ctx
        .read_registry()?
        .process()?
        .map(|record| record.ports)
        .unwrap_or_default();
    match describe(&ports, output::is_verbose()) {
        Some(line) => output::step(&line),
        None => output::muted("No ports are in use."),
    }
    Ok(())
}

pub fn describe(ports: &PortSet, verbose: bool) -> Option<String> {
    if ports.is_empty() {
        return None;
    }
    let show = |port: Option<u16>| port.map_or_else(|| "-".to_string(), |p| p.to_string());
    let mut line = format!("Local: {}, UI: {}", show(ports.local), show(ports.ui));
    if verbose {
        line.push_str(&format!(", Bundler: {}", show(ports.webpack)));
    }
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_recorded_ports() {
        let ports = PortSet {
            local: Some(3000),
            ui: Some(3001),
            webpack: Some(3002),
        };
        assert_eq!(describe(&ports, false).unwrap(), "Local: 3000, UI: 3001");
        assert_eq!(
            describe(&ports, true).unwrap(),
            "Local: 3000, UI: 3001, Bundler: 3002"
        );
    }

    #[test]
    fn no_ports_means_nothing_in_use() {
        assert!(describe(&PortSet::default(), true).is_none());
    }
}

//! HTML report rendering
//!
//! The template is compiled into the binary. Rendering is pure: the caller
//! decides where the bytes go (normally `<output>/report.html`).

use crate::{Aggregate, ScanError, TargetRecord};
use minijinja::{context, Environment};
use uuid::Uuid;

const REPORT_TEMPLATE: &str = include_str!("templates/report.html");

pub struct ReportEmitter {
    env: Environment<'static>,
    run_id: Uuid,
}

impl ReportEmitter {
    pub fn new() -> Result<Self, ScanError> {
        let mut env = Environment::new();

        env.add_filter("status_class", |status: u16| match status {
            200..=299 => "ok",
            300..=399 => "redirect",
            400..=599 => "fail",
            _ => "none",
        });

        env.add_template("report.html", REPORT_TEMPLATE)?;

        Ok(Self {
            env,
            run_id: Uuid::new_v4(),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn render(&self, result: &Aggregate) -> Result<Vec<u8>, ScanError> {
        let mut records: Vec<&TargetRecord> = result.records.iter().collect();
        records.sort_by(|a, b| a.url().cmp(b.url()));

        let generated_at = chrono::Utc::now()
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string();

        let template = self.env.get_template("report.html")?;
        let rendered = template.render(context! {
            run_id => self.run_id.to_string(),
            generated_at => generated_at,
            stats => &result.stats,
            success_rate => format!("{:.1}", result.stats.success_rate()),
            records => records,
            version => env!("CARGO_PKG_VERSION"),
        })?;

        Ok(rendered.into_bytes())
    }
}

use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static BELL: Emoji<'_, '_> = Emoji("🔔 ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_banner() {
    println!();
    println!("{}{}", BELL, style("nudge").bold().cyan());
    println!(
        "{}\n",
        style("When something happens, or when it is time, do something.").dim()
    );
}

/// A titled block of aligned rows for help and status output.
pub struct GuideSection {
    title: String,
    rows: Vec<String>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, about: &str) -> Self {
        self.rows.push(format!("  {:<14} {}", style(name).green(), about));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.rows.push(format!("  {} {}: {}", GEAR, style(label).bold().cyan(), value));
        self
    }

    pub fn text(mut self, line: &str) -> Self {
        self.rows.push(format!("  {}", line));
        self
    }

    pub fn print(self) {
        println!("{}", style(&self.title).bold().underlined());
        for row in self.rows {
            println!("{}", row);
        }
        println!();
    }
}

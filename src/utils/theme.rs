use colored::Colorize;

/// Styles for the shell's own messages. Program output is never touched.
pub struct Theme {
    pub error_style: Box<dyn Fn(String) -> String>,
    pub job_style: Box<dyn Fn(String) -> String>,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            error_style: Box::new(|s| s.bright_red().to_string()),
            job_style: Box::new(|s| s.bright_cyan().to_string()),
        }
    }
}

impl Theme {
    pub fn plain() -> Self {
        Theme {
            error_style: Box::new(|s| s),
            job_style: Box::new(|s| s),
        }
    }

    pub fn error(&self, message: impl Into<String>) -> String {
        (self.error_style)(message.into())
    }

    pub fn job(&self, message: impl Into<String>) -> String {
        (self.job_style)(message.into())
    }
}

pub fn load_theme(color: bool) -> Theme {
    if color {
        Theme::default()
    } else {
        Theme::plain()
    }
}

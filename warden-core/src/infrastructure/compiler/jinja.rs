// warden-core/src/infrastructure/compiler/jinja.rs

// Rule queries use `${name}` placeholders. They are turned into minijinja expressions
// (`{{ name }}`) and rendered with strict undefined: a typo in a placeholder is an error,
// never an empty string spliced into SQL.

use crate::application::ports::TemplateEngine;
use crate::error::WardenError;
use crate::infrastructure::error::InfrastructureError;
use minijinja::{Environment, UndefinedBehavior};
use regex::Regex;
use std::sync::OnceLock;

fn re_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([^}]*)\}")
            .unwrap_or_else(|_| Regex::new("$^").unwrap_or_else(|_| unreachable!()))
    })
}

pub struct JinjaRenderer<'a> {
    env: Environment<'a>,
}

impl<'a> JinjaRenderer<'a> {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        // ${ table | sql_string } -> 'orders'
        env.add_filter("sql_string", |value: &str| -> Result<String, minijinja::Error> {
            Ok(format!("'{}'", value.replace('\'', "''")))
        });

        Self { env }
    }

    /// `${x}` -> `{{ x }}`; everything else is emitted verbatim inside raw blocks.
    pub fn to_jinja(template: &str) -> String {
        let re = re_placeholder();
        let mut out = String::with_capacity(template.len() + 16);
        let mut last = 0;
        for caps in re.captures_iter(template) {
            let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            push_literal(&mut out, &template[last..whole.start()]);
            out.push_str("{{ ");
            out.push_str(expr.as_str().trim());
            out.push_str(" }}");
            last = whole.end();
        }
        push_literal(&mut out, &template[last..]);
        out
    }

    pub fn render_placeholders(
        &self,
        template: &str,
        context: &serde_json::Value,
    ) -> Result<String, InfrastructureError> {
        let source = Self::to_jinja(template);
        let rendered = self
            .env
            .render_str(&source, context)
            .map_err(InfrastructureError::TemplateError)?;
        Ok(rendered)
    }
}

fn push_literal(out: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if text.contains('{') || text.contains('}') {
        out.push_str("{% raw %}");
        out.push_str(text);
        out.push_str("{% endraw %}");
    } else {
        out.push_str(text);
    }
}

impl<'a> Default for JinjaRenderer<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> TemplateEngine for JinjaRenderer<'a> {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, WardenError> {
        self.render_placeholders(template, context)
            .map_err(WardenError::Infrastructure)
    }
}

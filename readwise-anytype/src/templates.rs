use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use once_cell::sync::OnceCell;
use readwise_common::{Book, Highlight};
use serde::Serialize;
use tera::{Context, Tera, Value};
use tracing::debug;

use crate::config::TemplateSource;

const TEMPLATE_NAME: &str = "book.md";

/// Everything a template can see while rendering one book.
#[derive(Debug, Serialize)]
pub struct TemplateData<'a> {
    pub book: &'a Book,
    pub highlights: &'a [Highlight],
    pub sync_date: &'a str,
}

pub enum TemplateRenderer {
    /// A Tera template read from disk and compiled on first use.
    File {
        path: PathBuf,
        compiled: OnceCell<Tera>,
    },

    /// The built-in markdown layout. The Anytype template itself is not fetched.
    Anytype { template_id: String },
}

impl TemplateRenderer {
    pub fn new(source: &TemplateSource) -> Self {
        match source {
            TemplateSource::File(path) => {
                debug!("Using markdown template from {:?}", path);
                TemplateRenderer::File {
                    path: path.clone(),
                    compiled: OnceCell::new(),
                }
            }
            TemplateSource::Anytype(template_id) => {
                debug!("Using built-in layout for Anytype template {}", template_id);
                TemplateRenderer::Anytype {
                    template_id: template_id.clone(),
                }
            }
        }
    }

    pub fn render(&self, data: &TemplateData<'_>) -> anyhow::Result<String> {
        match self {
            TemplateRenderer::File { path, compiled } => {
                let tera = compiled.get_or_try_init(|| load_template(path))?;
                let context = Context::from_serialize(data)?;

                tera.render(TEMPLATE_NAME, &context)
                    .with_context(|| format!("failed to execute template {:?}", path))
            }

            TemplateRenderer::Anytype { template_id } => {
                debug!(
                    "Rendering {} with the built-in layout (template {})",
                    data.book.title, template_id
                );
                Ok(render_builtin(data)?)
            }
        }
    }
}

fn load_template(path: &Path) -> anyhow::Result<Tera> {
    debug!("Loading markdown template from {:?}", path);

    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read template file {:?}", path))?;

    let mut tera = Tera::default();
    tera.register_function("add", add);
    tera.add_raw_template(TEMPLATE_NAME, &source)
        .with_context(|| format!("failed to parse template {:?}", path))?;

    Ok(tera)
}

/// `add(a=1, b=2)`, mostly for 1-based numbering inside loops.
fn add(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let operand = |name: &str| {
        args.get(name).and_then(Value::as_i64).ok_or_else(|| {
            tera::Error::msg(format!("`add` requires an integer `{}` argument", name))
        })
    };

    Ok(Value::from(operand("a")? + operand("b")?))
}

fn render_builtin(data: &TemplateData<'_>) -> Result<String, std::fmt::Error> {
    let book = data.book;
    let mut out = String::new();

    write!(out, "# {}\n\n", book.title)?;
    write!(out, "**Author:** {}\n\n", book.author_or_empty())?;
    write!(out, "**Category:** {}\n\n", book.category)?;
    write!(out, "**Source:** {}\n\n", book.source)?;
    write!(out, "**Synced on:** {}\n\n", data.sync_date)?;
    out.push_str("## Highlights\n\n");

    for (i, highlight) in data.highlights.iter().enumerate() {
        write!(out, "### Highlight {}\n\n", i + 1)?;
        write!(out, "{}\n\n", highlight.text)?;
        if highlight.has_note() {
            write!(out, "**Note:** {}\n\n", highlight.note)?;
        }
    }

    Ok(out)
}

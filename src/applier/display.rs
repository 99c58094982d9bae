//! Fixed-width listing of targets and their custom group properties.

use std::io::{self, Write};

use itertools::Itertools;

use crate::model::{Target, TargetProperty};

/// Leading name segments that mark a custom group property.
pub const RESERVED_PREFIX: [&str; 2] = ["orcl", "gtp"];

const TYPE_WIDTH: usize = 40;
const LABEL_WIDTH: usize = 30;
const TARGET_INDENT: usize = 5;
const PROPERTY_INDENT: usize = 15;
const RULE_WIDTH: usize = 80;

/// Human label for a custom group property, or `None` for any other property.
///
/// The reserved prefix is `orcl.gtp.` or `orcl_gtp_`, and its delimiter is the
/// only one split on in the rest of the name: `orcl_gtp_line_of_bus` becomes
/// `line of bus`, `orcl.gtp.cost_center` becomes `cost_center`. A prefix
/// mixing both delimiters is not reserved.
pub fn group_label(property_name: &str) -> Option<String> {
    ['.', '_'].into_iter().find_map(|delimiter| {
        let prefix: String = RESERVED_PREFIX
            .iter()
            .map(|segment| format!("{segment}{delimiter}"))
            .collect();
        property_name
            .strip_prefix(prefix.as_str())
            .map(|rest| rest.split(delimiter).join(" "))
    })
}

/// Right-pad with dots to `width` characters. Longer text is left as is.
fn dot_pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    format!("{text}{}", ".".repeat(width - len))
}

pub fn write_header<W: Write + ?Sized>(out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        "{:indent$}{}{}",
        "",
        dot_pad("TARGET_TYPE", TYPE_WIDTH),
        "TARGET_NAME",
        indent = TARGET_INDENT
    )?;
    writeln!(
        out,
        "{:indent$}{}{}",
        "",
        dot_pad("PROPERTY_NAME", LABEL_WIDTH),
        "PROPERTY_VALUE",
        indent = PROPERTY_INDENT
    )?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(out)
}

/// One target line, its custom group properties, and a blank separator line.
pub fn write_target<'a, W, I>(out: &mut W, target: &Target, properties: I) -> io::Result<()>
where
    W: Write + ?Sized,
    I: IntoIterator<Item = &'a TargetProperty>,
{
    writeln!(
        out,
        "{:indent$}{}{}",
        "",
        dot_pad(&target.target_type, TYPE_WIDTH),
        target.name,
        indent = TARGET_INDENT
    )?;
    for prop in properties {
        if let Some(label) = group_label(&prop.name) {
            writeln!(
                out,
                "{:indent$}{}{}",
                "",
                dot_pad(&label, LABEL_WIDTH),
                prop.value,
                indent = PROPERTY_INDENT
            )?;
        }
    }
    writeln!(out)
}

/// One line per target for `list`: type, name and agent URL.
pub fn write_target_row<W: Write + ?Sized>(out: &mut W, target: &Target) -> io::Result<()> {
    writeln!(
        out,
        "{}{}  {}",
        dot_pad(&target.target_type, TYPE_WIDTH),
        target.name,
        target.agent_url.as_deref().unwrap_or("-")
    )
}

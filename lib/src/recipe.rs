//! Reconstructs a Dockerfile from the layer history of an image.
//!
//! Layer history only records the command that created each layer,
//! so the output is an approximation: build context, multi-stage structure,
//! and `.dockerignore` rules can't be recovered.

use std::sync::LazyLock;

use bon::Builder;
use itertools::Itertools;
use regex::Regex;
use strum::{AsRefStr, EnumIter, IntoEnumIterator};

use crate::{ContentId, Engine, Error, HistoryRecord};

/// Prefix the classic builder records for declarative instructions such as `ENV` or `WORKDIR`.
const NOP_MARKER: &str = "/bin/sh -c #(nop) ";

/// Prefix recorded for layers created by a shell command.
const SHELL: &str = "/bin/sh -c";

/// Inserted in front of [`SHELL`] to make it a standalone instruction.
const RUN: &str = "RUN ";

/// Shell command separator.
const AND: &str = "&&";

/// Line continuation inserted in front of [`AND`].
const CONTINUATION: &str = "\\\n    ";

/// Instructions that the classic builder records behind [`NOP_MARKER`].
///
/// When the marker is stripped these are left with a stray leading space,
/// which the cleaning pipeline removes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, AsRefStr, EnumIter)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Keyword {
    Env,
    Expose,
    Arg,
    Label,
    User,
    Cmd,
    Maintainer,
    Entrypoint,
    StopSignal,
    Copy,
    Volume,
    Workdir,
    Onbuild,
    Healthcheck,
    Shell,
}

/// Matches a single space at the start of a line followed by a [`Keyword`] and whitespace.
///
/// Shell assignments such as ` ENV=1` don't match.
static STRAY_KEYWORD_SPACE: LazyLock<Regex> = LazyLock::new(|| {
    let keywords = Keyword::iter()
        .map(|keyword| keyword.as_ref().to_owned())
        .join("|");
    Regex::new(&format!(r"(?m)^ ({keywords})(\s)")).expect("keyword pattern is valid")
});

/// A reconstructed Dockerfile.
///
/// ```
/// # use hindsight_lib::recipe::Recipe;
/// let recipe = Recipe::builder()
///     .base("ubuntu:focal")
///     .instructions(vec![String::from("WORKDIR /app")])
///     .build();
/// assert_eq!(recipe.to_string(), "FROM ubuntu:focal\nWORKDIR /app\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct Recipe {
    /// The image named by the leading `FROM` instruction.
    #[builder(into)]
    pub base: String,

    /// Cleaned instructions in build order, one per contributing layer.
    ///
    /// A single instruction may span several lines.
    #[builder(into, default)]
    pub instructions: Vec<String>,
}

impl Recipe {
    /// Every line of the rendered recipe, starting with the `FROM` instruction.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(format!("FROM {}", self.base)).chain(
            self.instructions
                .iter()
                .flat_map(|instruction| instruction.lines())
                .map(String::from),
        )
    }
}

impl std::fmt::Display for Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "FROM {}", self.base)?;
        for instruction in &self.instructions {
            writeln!(f, "{instruction}")?;
        }
        Ok(())
    }
}

/// Reconstruct the recipe for the image, anchored on the provided base image tag.
pub async fn build_recipe(
    engine: &impl Engine,
    id: &ContentId,
    base: &str,
) -> Result<Recipe, Error> {
    let history = engine.history(id).await?;
    Ok(reconstruct(&history, base))
}

/// Reconstruct the recipe from history records delivered newest-first.
///
/// Records without a creation command, or whose command is only the no-op marker,
/// describe metadata-only layers and contribute nothing.
pub fn reconstruct(history: &[HistoryRecord], base: &str) -> Recipe {
    let instructions = history
        .iter()
        .rev()
        .filter(|record| !record.created_by.is_empty())
        .map(|record| clean(&record.created_by))
        .filter(|instruction| !instruction.is_empty())
        .collect::<Vec<_>>();

    Recipe::builder()
        .base(base)
        .instructions(instructions)
        .build()
}

/// Turn a recorded creation command into a build instruction.
///
/// The steps run in order, each relying on the rewrites before it:
/// 1. Strip the no-op marker that precedes declarative instructions.
/// 2. Prefix remaining shell invocations with `RUN`.
/// 3. Break `&&` chains onto indented continuation lines.
/// 4. Remove the stray space the marker leaves in front of declarative keywords.
///
/// Text that fits none of these shapes is passed through unchanged,
/// and cleaning an already cleaned instruction changes nothing.
///
/// ```
/// # use hindsight_lib::recipe::clean;
/// assert_eq!(clean("/bin/sh -c #(nop)  EXPOSE 80"), "EXPOSE 80");
/// assert_eq!(clean("/bin/sh -c make && make install"), "RUN /bin/sh -c make \\\n    && make install");
/// ```
pub fn clean(created_by: &str) -> String {
    let stripped = created_by.replace(NOP_MARKER, "");
    let run = insert_before(&stripped, SHELL, RUN);
    let continued = insert_before(&run, AND, CONTINUATION);
    STRAY_KEYWORD_SPACE
        .replace_all(&continued, "${1}${2}")
        .into_owned()
}

/// Insert `prefix` in front of every occurrence of `needle` that isn't already preceded by it.
fn insert_before(text: &str, needle: &str, prefix: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut last = 0;
    for (at, _) in text.match_indices(needle) {
        if text[..at].ends_with(prefix) {
            continue;
        }
        output.push_str(&text[last..at]);
        output.push_str(prefix);
        last = at;
    }
    output.push_str(&text[last..]);
    output
}

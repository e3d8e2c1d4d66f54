//! Budget-bounded composition of diagnostics and snippets.
//!
//! Diagnostic text is never truncated. When the total exceeds the budget the
//! composer shrinks snippet radii one step at a time, note-only snippets
//! first, then the snippets of errors and warnings. If radius zero is still
//! too large it drops the snippets of the latest diagnostic, repeating until
//! the context fits or nothing is left to drop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use diagctx_config::EngineConfig;

use crate::diagnostic::Diagnostic;
use crate::error::Issue;
use crate::snippet::{Highlight, Snippet, merge_windows, window};

/// The final bundle handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplanationContext {
    pub diagnostics: Vec<Diagnostic>,
    /// Grouped by file in first-referenced order, then by start line.
    pub snippets: Vec<Snippet>,
    pub truncated: bool,
    pub budget_used: usize,
    pub max_budget: usize,
    /// Indices of diagnostics whose snippets were dropped to fit the budget.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lost_snippets: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}

impl ExplanationContext {
    pub fn empty(max_budget: usize) -> Self {
        Self {
            diagnostics: Vec::new(),
            snippets: Vec::new(),
            truncated: false,
            budget_used: 0,
            max_budget,
            lost_snippets: Vec::new(),
            issues: Vec::new(),
        }
    }

    /// Snippets that support the given top-level diagnostic.
    pub fn snippets_for(&self, diagnostic: usize) -> Vec<&Snippet> {
        self.snippets
            .iter()
            .filter(|s| s.supports(diagnostic))
            .collect()
    }

    /// Distinct snippet files, in presentation order.
    pub fn files(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = Vec::new();
        for snippet in &self.snippets {
            if !files.contains(&snippet.file.as_path()) {
                files.push(&snippet.file);
            }
        }
        files
    }

    /// Cost of the diagnostic text alone.
    pub fn diagnostics_cost(&self) -> usize {
        diagnostics_cost(&self.diagnostics)
    }

    /// Cost of the whole context as currently assembled.
    pub fn cost(&self) -> usize {
        self.diagnostics_cost() + snippets_cost(&self.snippets)
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

fn diagnostics_cost(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().map(Diagnostic::cost).sum()
}

fn snippets_cost(snippets: &[Snippet]) -> usize {
    snippets.iter().map(Snippet::cost).sum()
}

/// Which snippets a radius-shrink step may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    NoteOnly,
    Primary,
}

/// A merged snippet as initially extracted, plus the highlights still live
/// inside it. Shrunk snippets are re-sliced from `parent.lines`.
struct Working {
    parent: Snippet,
    live: Vec<Highlight>,
}

impl Working {
    /// Current windows, merged and sliced from the parent's text.
    fn build(&self, merge_gap: u32) -> Vec<Snippet> {
        let (lo, hi) = (self.parent.start_line, self.parent.end_line);
        let windows = self
            .live
            .iter()
            .filter_map(|h| window(h.line, h.radius, lo, hi).map(|(s, e)| (s, e, h.clone())))
            .collect();
        merge_windows(windows, merge_gap)
            .into_iter()
            .map(|(start, end, highlights)| {
                let from = (start - lo) as usize;
                let to = (end - lo) as usize + 1;
                Snippet {
                    file: self.parent.file.clone(),
                    resolved: self.parent.resolved.clone(),
                    start_line: start,
                    end_line: end,
                    highlights,
                    lines: self
                        .parent
                        .lines
                        .get(from..to)
                        .map(<[String]>::to_vec)
                        .unwrap_or_default(),
                }
            })
            .collect()
    }
}

/// Assembles an [`ExplanationContext`] within a character budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Composer {
    max_budget: usize,
    merge_gap: u32,
}

impl Composer {
    pub fn new(max_budget: usize, merge_gap: u32) -> Self {
        Self {
            max_budget,
            merge_gap,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_budget, config.merge_gap_threshold)
    }

    /// Compose freshly extracted snippets with their diagnostics.
    pub fn compose(
        &self,
        diagnostics: Vec<Diagnostic>,
        snippets: Vec<Snippet>,
        issues: Vec<Issue>,
    ) -> ExplanationContext {
        self.fit(ExplanationContext {
            diagnostics,
            snippets,
            truncated: false,
            budget_used: 0,
            max_budget: self.max_budget,
            lost_snippets: Vec::new(),
            issues,
        })
    }

    /// Re-apply the budget to an existing context.
    ///
    /// A context already within this composer's budget comes back unchanged.
    pub fn recompose(&self, context: ExplanationContext) -> ExplanationContext {
        let mut context = context;
        context.max_budget = self.max_budget;
        self.fit(context)
    }

    fn fit(&self, mut ctx: ExplanationContext) -> ExplanationContext {
        order_snippets(&ctx.diagnostics, &mut ctx.snippets);
        let text_cost = ctx.diagnostics_cost();
        let initial = text_cost + snippets_cost(&ctx.snippets);
        if initial <= self.max_budget {
            ctx.budget_used = initial;
            return ctx;
        }

        ctx.truncated = true;
        if text_cost > self.max_budget {
            for idx in owners(&ctx.snippets) {
                push_lost(&mut ctx.lost_snippets, idx);
            }
            ctx.snippets.clear();
            return self.irreducible(ctx, text_cost);
        }

        let mut working: Vec<Working> = std::mem::take(&mut ctx.snippets)
            .into_iter()
            .map(|parent| Working {
                live: parent.highlights.clone(),
                parent,
            })
            .collect();

        loop {
            let built: Vec<(usize, Snippet)> = working
                .iter()
                .enumerate()
                .flat_map(|(idx, w)| w.build(self.merge_gap).into_iter().map(move |s| (idx, s)))
                .collect();
            let cost = text_cost + built.iter().map(|(_, s)| s.cost()).sum::<usize>();
            if cost <= self.max_budget {
                ctx.snippets = built.into_iter().map(|(_, s)| s).collect();
                ctx.budget_used = cost;
                ctx.lost_snippets.sort_unstable();
                info!(
                    budget_used = cost,
                    max_budget = self.max_budget,
                    lost = ctx.lost_snippets.len(),
                    "Shrunk context to fit budget"
                );
                return ctx;
            }

            if shrink_radius(&built, &mut working, Tier::NoteOnly)
                || shrink_radius(&built, &mut working, Tier::Primary)
            {
                continue;
            }
            match drop_latest(&mut working) {
                Some(idx) => push_lost(&mut ctx.lost_snippets, idx),
                None => {
                    ctx.snippets.clear();
                    return self.irreducible(ctx, text_cost);
                }
            }
        }
    }

    fn irreducible(&self, mut ctx: ExplanationContext, required: usize) -> ExplanationContext {
        warn!(
            required,
            budget = self.max_budget,
            "Diagnostic text alone exceeds the budget"
        );
        ctx.budget_used = required;
        ctx.lost_snippets.sort_unstable();
        let issue = Issue::BudgetExceededIrreducibly {
            required,
            budget: self.max_budget,
        };
        if !ctx.issues.contains(&issue) {
            ctx.issues.push(issue);
        }
        ctx
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Sort snippets by file in first-referenced order, then by start line.
///
/// A file's rank is the earliest (diagnostic, chain position) among the
/// highlights that point into it.
fn order_snippets(diagnostics: &[Diagnostic], snippets: &mut [Snippet]) {
    let mut rank: HashMap<PathBuf, (usize, usize)> = HashMap::new();
    for snippet in snippets.iter() {
        let key = snippet
            .highlights
            .iter()
            .map(Highlight::key)
            .min()
            .unwrap_or((diagnostics.len(), 0));
        rank.entry(snippet.source_key().to_path_buf())
            .and_modify(|r| *r = (*r).min(key))
            .or_insert(key);
    }
    snippets.sort_by(|a, b| {
        let (ka, kb) = (a.source_key(), b.source_key());
        rank.get(ka)
            .cmp(&rank.get(kb))
            .then_with(|| ka.cmp(kb))
            .then(a.start_line.cmp(&b.start_line))
    });
}

fn owners(snippets: &[Snippet]) -> Vec<usize> {
    let mut owners: Vec<usize> = snippets
        .iter()
        .flat_map(|s| s.highlights.iter().map(|h| h.diagnostic))
        .collect();
    owners.sort_unstable();
    owners.dedup();
    owners
}

fn push_lost(lost: &mut Vec<usize>, idx: usize) {
    if !lost.contains(&idx) {
        lost.push(idx);
    }
}

/// Decrement the radius of the latest-owned snippet in `tier` that can
/// still shrink. Returns `false` when no such snippet exists.
fn shrink_radius(built: &[(usize, Snippet)], working: &mut [Working], tier: Tier) -> bool {
    let target = built
        .iter()
        .filter(|(_, s)| match tier {
            Tier::NoteOnly => s.is_note_only(),
            Tier::Primary => !s.is_note_only(),
        })
        .filter(|(_, s)| s.highlights.iter().any(|h| h.radius > 0))
        .max_by_key(|(parent, s)| {
            let owner = s.highlights.iter().map(|h| h.diagnostic).max().unwrap_or(0);
            (owner, *parent, s.start_line)
        });
    let Some((parent, snippet)) = target else {
        return false;
    };

    for live in &mut working[*parent].live {
        if live.radius > 0 && snippet.highlights.iter().any(|h| h.key() == live.key()) {
            live.radius -= 1;
        }
    }
    true
}

/// Remove every remaining highlight of the latest diagnostic that has any.
fn drop_latest(working: &mut [Working]) -> Option<usize> {
    let latest = working
        .iter()
        .flat_map(|w| w.live.iter().map(|h| h.diagnostic))
        .max()?;
    for w in working.iter_mut() {
        w.live.retain(|h| h.diagnostic != latest);
    }
    Some(latest)
}

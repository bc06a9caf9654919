//! Deterministic local content used when the remote generator is unavailable.

use rand::Rng;
use rand::seq::IndexedRandom;

/// Prompt-pack categories, in document order.
pub const CATEGORIES: [&str; 4] = ["Research", "Writing", "Personalization", "QA"];

/// Number of prompt entries in a pack.
pub const PACK_ITEMS: usize = 30;

/// Topics used when the topic bank lists no long-tail queries.
pub const BUILTIN_TOPICS: [&str; 3] = [
    "etsy seo for [sub-niche]",
    "best titles for [product]",
    "tags for [theme]",
];

/// Query the fallback article answers when the topic bank lists none.
pub const BUILTIN_QUERY: &str = "how to write etsy descriptions fast";

const MINI_TEMPLATE: &str = "## Notion Mini-Template
- Properties: Status (Select), Week (Number), Year (Number), Keywords (Multi-select)
- Template blocks:
  1) Checklist: Research → Draft → Edit → Publish
  2) Callout: Title formula
  3) Code block: Tag list
  4) Toggle: Personalization ideas
  5) Divider
  6) Gallery view link
  7) CTA snippet
- How to use (SOP):
  1) Duplicate the template
  2) Fill product + keywords
  3) Generate titles/tags
  4) Paste description
  5) QA then publish
";

const MICRO_CASES: &str = "## Micro Cases
- **Before:** Generic title → **After:** Keyword-rich title with benefit
- **Before:** Random tags → **After:** 13 focused tags mapped to sub-niche
- **Before:** Wall of text → **After:** Scannable bullets + CTA
";

/// How many items each category gets: as even as possible, earlier categories first.
pub fn items_per_category(total: usize, categories: usize) -> Vec<usize> {
    if categories == 0 {
        return Vec::new();
    }
    let base = total / categories;
    let extra = total % categories;
    (0..categories).map(|i| base + usize::from(i < extra)).collect()
}

/// Build the baseline prompt pack.
///
/// Topics are drawn from `queries` (or [`BUILTIN_TOPICS`] when empty) with
/// the supplied generator, so a generator seeded from the period key gives
/// the same pack on every re-run.
pub fn fallback_pack<R: Rng + ?Sized>(
    niche: &str,
    period: u32,
    queries: &[String],
    rng: &mut R,
) -> String {
    let topics: Vec<&str> = if queries.is_empty() {
        BUILTIN_TOPICS.to_vec()
    } else {
        queries.iter().map(String::as_str).collect()
    };

    let mut sections = Vec::new();
    let counts = items_per_category(PACK_ITEMS, CATEGORIES.len());

    for (category, count) in CATEGORIES.iter().zip(counts) {
        sections.push(format!("## {category}"));
        for i in 1..=count {
            let topic = topics.choose(&mut *rng).copied().unwrap_or(BUILTIN_TOPICS[0]);
            sections.push(format!(
                "- **Prompt {i}**: Create {} guidance for '{topic}'.\n  \
                 - *Example input:* product='[your product]', niche='[your niche]'\n  \
                 - *Swap-in variables:* product, niche, audience, tone",
                category.to_lowercase()
            ));
        }
    }

    format!(
        "# {niche} — Week {period}\n\n{}\n\n{MINI_TEMPLATE}\n\n{MICRO_CASES}\n\n\
         _Changelog Week {period}: baseline template generated._\n",
        sections.join("\n")
    )
}

/// Build the baseline short article for one query.
pub fn fallback_article(niche: &str, query: &str) -> String {
    format!(
        "# {title}

## Why it matters
Clear, keyword-aligned listings rank and convert better for **{niche}**.

## Steps
1) Collect 10 seed keywords (use Etsy search suggestions).
2) Pick 1 primary + 2 secondary keywords.
3) Write a benefit-first title using a formula: [Primary] + [Style/Material] + [Use/Occasion].
4) Description:
   - Hook (1–2 lines)
   - Specs bullets
   - Personalization prompt
   - Care/Shipping
   - CTA
5) Tags (13): mix of exact match + modifiers.

## Example title formulas
- [Primary keyword] • [Material] • [Audience/Occasion]
- [Primary keyword] – [Style] – [Benefit]

## CTA
Grab the free starter kit in the Members Hub.
",
        title = title_case(query)
    )
}

/// Uppercase the first letter of every run of letters, lowercase the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

//! Positional HTML scanning helpers.
//!
//! The portal serves server-rendered pages where every field of interest
//! carries a stable `id` or `class` attribute, so extraction is done by
//! scanning for those attributes and depth-matching tags rather than
//! building a DOM.

const VOID_TAGS: &[&str] = &["input", "br", "hr", "img", "meta", "link"];

/// Inner HTML of the element carrying `id="<id>"`.
pub fn element_by_id<'a>(html: &'a str, id: &str) -> Option<&'a str> {
    let lt = open_tag_by_id(html, id)?;
    let (start, end) = inner_bounds(html, lt)?;
    Some(&html[start..end])
}

/// Visible text of the element carrying `id="<id>"`: tags stripped,
/// entities decoded, whitespace collapsed. `None` when absent or empty.
pub fn text_by_id(html: &str, id: &str) -> Option<String> {
    let text = strip_tags(element_by_id(html, id)?);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Value of `attr` on the element carrying `id="<id>"`.
pub fn attr_by_id(html: &str, id: &str, attr: &str) -> Option<String> {
    let lt = open_tag_by_id(html, id)?;
    let gt = lt + html[lt..].find('>')?;
    attr_in(&html[lt..=gt], attr)
}

/// Inner HTML of every `<tag>` element, in document order. Elements nested
/// inside a match are part of that match, not separate entries.
pub fn elements_by_tag<'a>(html: &'a str, tag: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(i) = html[pos..].find('<') {
        let lt = pos + i;
        if starts_tag(&html[lt + 1..], tag) {
            if let Some((start, end)) = inner_bounds(html, lt) {
                out.push(&html[start..end]);
                pos = end.max(lt + 1);
                continue;
            }
        }
        pos = lt + 1;
    }
    out
}

/// Inner HTML of every element whose `class` list contains `class`.
pub fn elements_by_class<'a>(html: &'a str, class: &str) -> Vec<&'a str> {
    class_match_positions(html, class)
        .into_iter()
        .filter_map(|lt| inner_bounds(html, lt).map(|(s, e)| &html[s..e]))
        .collect()
}

/// Value of `attr` on every element whose `class` list contains `class`.
pub fn class_attr_values(html: &str, class: &str, attr: &str) -> Vec<String> {
    class_match_positions(html, class)
        .into_iter()
        .filter_map(|lt| {
            let gt = lt + html[lt..].find('>')?;
            attr_in(&html[lt..=gt], attr)
        })
        .collect()
}

/// Whether any element carries `class` in its class list.
pub fn has_class(html: &str, class: &str) -> bool {
    !class_match_positions(html, class).is_empty()
}

/// Every value of `attr` across the fragment, in document order.
pub fn attr_values(html: &str, attr: &str) -> Vec<String> {
    let needle = format!("{}=\"", attr);
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(i) = html[pos..].find(&needle) {
        let at = pos + i;
        let vstart = at + needle.len();
        let Some(vlen) = html[vstart..].find('"') else {
            break;
        };
        if at == 0 || html.as_bytes()[at - 1].is_ascii_whitespace() {
            out.push(decode_entities(&html[vstart..vstart + vlen]));
        }
        pos = vstart + vlen + 1;
    }
    out
}

/// Tags removed, entities decoded, whitespace runs collapsed to a space.
pub fn strip_tags(fragment: &str) -> String {
    let mut text = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for ch in fragment.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    let decoded = decode_entities(&text);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `<` positions of every open tag whose `class` list contains `class` as
/// a whole token.
fn class_match_positions(html: &str, class: &str) -> Vec<usize> {
    let mut out = Vec::new();
    let mut pos = 0;
    while let Some(i) = html[pos..].find("class=\"") {
        let at = pos + i;
        let vstart = at + "class=\"".len();
        let Some(vlen) = html[vstart..].find('"') else {
            break;
        };
        let tokens = &html[vstart..vstart + vlen];
        if at > 0
            && html.as_bytes()[at - 1].is_ascii_whitespace()
            && tokens.split_ascii_whitespace().any(|t| t == class)
        {
            if let Some(lt) = html[..at].rfind('<') {
                out.push(lt);
            }
        }
        pos = vstart + vlen + 1;
    }
    out
}

fn open_tag_by_id(html: &str, id: &str) -> Option<usize> {
    let needle = format!("id=\"{}\"", id);
    let mut pos = 0;
    while let Some(i) = html[pos..].find(&needle) {
        let at = pos + i;
        if at > 0 && html.as_bytes()[at - 1].is_ascii_whitespace() {
            return html[..at].rfind('<');
        }
        pos = at + needle.len();
    }
    None
}

fn attr_in(open_tag: &str, attr: &str) -> Option<String> {
    let needle = format!("{}=\"", attr);
    let mut pos = 0;
    while let Some(i) = open_tag[pos..].find(&needle) {
        let at = pos + i;
        let vstart = at + needle.len();
        let vlen = open_tag[vstart..].find('"')?;
        if at > 0 && open_tag.as_bytes()[at - 1].is_ascii_whitespace() {
            return Some(decode_entities(&open_tag[vstart..vstart + vlen]));
        }
        pos = vstart + vlen + 1;
    }
    None
}

/// Bounds of the content between an opening tag at `lt` and its matching
/// close. Void and self-closed elements yield an empty range.
fn inner_bounds(html: &str, lt: usize) -> Option<(usize, usize)> {
    let gt = lt + html[lt..].find('>')?;
    let name_end = html[lt + 1..gt]
        .find(|c: char| !c.is_ascii_alphanumeric())
        .map(|i| lt + 1 + i)
        .unwrap_or(gt);
    let name = &html[lt + 1..name_end];
    if name.is_empty() {
        return None;
    }
    let void = VOID_TAGS.iter().any(|t| name.eq_ignore_ascii_case(t));
    if void || html[..gt].ends_with('/') {
        return Some((gt + 1, gt + 1));
    }
    let close = matching_close(html, name, gt + 1)?;
    Some((gt + 1, close))
}

/// Position of the `<` of the close tag matching an already-open `tag`,
/// scanning from `from` with nesting awareness.
fn matching_close(html: &str, tag: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut pos = from;
    loop {
        let lt = pos + html[pos..].find('<')?;
        let rest = &html[lt + 1..];
        if let Some(after_slash) = rest.strip_prefix('/') {
            if starts_tag_name(after_slash, tag) {
                depth -= 1;
                if depth == 0 {
                    return Some(lt);
                }
            }
        } else if starts_tag(rest, tag) {
            depth += 1;
        }
        pos = lt + 1;
    }
}

/// Whether `s` (the text right after a `<`) opens a `tag` element.
fn starts_tag(s: &str, tag: &str) -> bool {
    !s.starts_with('/') && starts_tag_name(s, tag)
}

fn starts_tag_name(s: &str, tag: &str) -> bool {
    s.len() >= tag.len()
        && s[..tag.len()].eq_ignore_ascii_case(tag)
        && s[tag.len()..]
            .chars()
            .next()
            .map_or(true, |c| c == '>' || c == '/' || c.is_ascii_whitespace())
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        // Entities are short; a distant semicolon means a bare ampersand.
        let Some(semi) = tail.find(';').filter(|&i| i <= 10) else {
            out.push('&');
            rest = &rest[amp + 1..];
            continue;
        };
        match &tail[1..semi] {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            "nbsp" => out.push(' '),
            // The portal's pages are Spanish; these cover its labels.
            "aacute" => out.push('á'),
            "eacute" => out.push('é'),
            "iacute" => out.push('í'),
            "oacute" => out.push('ó'),
            "uacute" => out.push('ú'),
            "ntilde" => out.push('ñ'),
            entity => {
                let code = entity.strip_prefix('#').and_then(|num| {
                    match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => num.parse().ok(),
                    }
                });
                match code.and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => out.push_str(&tail[..=semi]),
                }
            }
        }
        rest = &rest[amp + semi + 1..];
    }
    out.push_str(rest);
    out
}

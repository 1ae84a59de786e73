use anyhow::{Context, Result};
use headless_chrome::{Element, Tab};
use serde_json::Value;
use std::sync::Arc;

/// JavaScript that produces a compact, line-oriented serialization of the page.
///
/// Reads the DOM without changing layout. Interactive elements (links,
/// buttons, inputs, textareas, selects) are tagged with `data-pilot-id="eN"`
/// and listed with the CSS selector the model should use to target them;
/// short visible text leaves are listed as quoted strings.
const SERIALIZE_DOM_JS: &str = r#"
(() => {
  const SKIP = new Set(['SCRIPT','STYLE','NOSCRIPT','SVG','LINK','META']);
  const INTERACTIVE = ['a','button','input','textarea','select'];
  let id = 0;
  const lines = [];
  const seen = new Set();

  function isVisible(el) {
    if (el.offsetParent === null && el.tagName !== 'BODY' && el.tagName !== 'HTML') return false;
    const s = getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0';
  }

  function describe(el, tag, sel) {
    const text = (el.textContent || '').trim().slice(0, 60);
    switch (tag) {
      case 'a': return sel + ' link "' + text + '"' + (el.href ? ' href=' + el.href : '');
      case 'button': return sel + ' button "' + text + '"';
      case 'select':
        return sel + ' select [' + [...el.options].map(o => o.text.trim().slice(0, 20)).join('|') + ']';
      default: {
        let d = sel + ' ' + tag + ' type=' + (el.type || 'text') + ' placeholder="' + (el.placeholder || '') + '"';
        if (el.name) d += ' name=' + el.name;
        if (el.value) d += ' value="' + String(el.value).slice(0, 30) + '"';
        return d;
      }
    }
  }

  function walk(node, depth) {
    if (depth > 15) return;
    for (const child of node.children) {
      if (SKIP.has(child.tagName) || !isVisible(child)) continue;
      const tag = child.tagName.toLowerCase();
      if (INTERACTIVE.includes(tag)) {
        const pid = 'e' + (id++);
        child.setAttribute('data-pilot-id', pid);
        const line = describe(child, tag, '[data-pilot-id="' + pid + '"]');
        if (!seen.has(line)) { seen.add(line); lines.push(line); }
      } else if (child.children.length === 0) {
        const text = (child.textContent || '').trim();
        if (text.length > 2 && text.length < 200) {
          const t = '  "' + text.slice(0, 100) + '"';
          if (!seen.has(t)) { seen.add(t); lines.push(t); }
        }
      }
      walk(child, depth + 1);
    }
  }

  if (document.body) walk(document.body, 0);
  return lines.join('\n');
})()
"#;

/// Serialize the current page into the compact form sent to the model.
pub fn serialize_dom(tab: &Arc<Tab>) -> Result<String> {
    let result = tab
        .evaluate(SERIALIZE_DOM_JS, false)
        .context("DOM serialization script failed")?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default())
}

/// Get the current page title.
pub fn get_page_title(tab: &Arc<Tab>) -> Result<String> {
    let result = tab.evaluate("document.title", false)?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "Unknown".to_string()))
}

pub fn scroll_by(tab: &Arc<Tab>, dx: i64, dy: i64) -> Result<()> {
    tab.evaluate(&format!("window.scrollBy({dx}, {dy})"), false)
        .context("scroll script failed")?;
    Ok(())
}

/// Clear the value of the element currently matched by `selector`.
pub fn clear_value(tab: &Arc<Tab>, selector: &str) -> Result<()> {
    let selector = serde_json::to_string(selector)?;
    tab.evaluate(
        &format!("(el => {{ if (el && 'value' in el) el.value = ''; }})(document.querySelector({selector}))"),
        false,
    )?;
    Ok(())
}

/// Read an attribute of `element`. `Ok(None)` means it is not set.
pub fn read_attribute(element: &Element<'_>, attribute: &str) -> Result<Option<String>> {
    let result = element.call_js_fn(
        "function (name) { return this.getAttribute(name); }",
        vec![Value::String(attribute.to_string())],
        false,
    )?;
    Ok(result.value.and_then(|v| v.as_str().map(String::from)))
}

/// Cut `text` to at most `max_chars` characters, appending a marker that
/// says how much was there.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}\n... [truncated, {total} total chars]")
}

use tracing::debug;

use crate::browser::dom::NodeSnapshot;
use crate::browser::driver::{DynPage, SelectorKind};
use crate::challenge::detectors::{is_code_input, is_digit_box, is_verify_control};
use crate::error::EngineResult;

/// Types a retrieved code into whatever entry UI the page presents:
/// a consolidated field first, then split per-digit boxes. Returns `false`
/// when neither shape is on the page.
pub async fn enter_code(page: &DynPage, code: &str) -> EngineResult<bool> {
    let inputs = page.query(SelectorKind::Css, "input").await?;

    if let Some(field) = inputs.iter().find(|n| is_code_input(n)) {
        debug!(node = field.node, "entering code into consolidated field");
        page.set_text(field.node, code).await?;
        if !click_verify(page).await? {
            // no labelled control; these forms submit on Enter
            page.press_key(Some(field.node), "Enter").await?;
        }
        return Ok(true);
    }

    let boxes: Vec<&NodeSnapshot> = inputs.iter().filter(|n| is_digit_box(n)).collect();
    if (4..=8).contains(&boxes.len()) {
        let digits: Vec<char> = code.chars().filter(char::is_ascii_digit).collect();
        debug!(
            boxes = boxes.len(),
            digits = digits.len(),
            "entering code into digit boxes"
        );
        for (slot, digit) in boxes.iter().zip(digits.iter()) {
            page.set_text(slot.node, &digit.to_string()).await?;
        }
        return Ok(true);
    }

    Ok(false)
}

async fn click_verify(page: &DynPage) -> EngineResult<bool> {
    let mut controls = page.query(SelectorKind::Css, "button").await?;
    controls.extend(page.query(SelectorKind::Css, "[role=\"button\"]").await?);
    controls.extend(page.query(SelectorKind::Css, "input").await?);
    if let Some(control) = controls.iter().find(|n| is_verify_control(n)) {
        debug!(node = control.node, "clicking verify control");
        page.click(control.node).await?;
        return Ok(true);
    }
    Ok(false)
}

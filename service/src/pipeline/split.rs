//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Command separator splitting

use mudproxy_records::{
    RecordContext, RecordResult, TrackedRecord, UpdateEntry, UpdateFlag, WireBatch, WireLine,
};

/// Split one line of input on `separator`.
///
/// A doubled separator is never a split point; it becomes one literal
/// separator in the output.
///
/// ```
/// use mudproxy_service::pipeline::split_on_separator;
///
/// assert_eq!(split_on_separator("look|score", '|'), vec!["look", "score"]);
/// assert_eq!(split_on_separator("say hi||there", '|'), vec!["say hi|there"]);
/// ```
pub fn split_on_separator(text: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != separator {
            current.push(ch);
        } else if chars.peek() == Some(&separator) {
            chars.next();
            current.push(separator);
        } else {
            parts.push(std::mem::take(&mut current));
        }
    }
    parts.push(current);
    parts
}

/// Apply [`split_on_separator`] to every IO line of a batch.
///
/// A line that splits into several commands is replaced by one line per
/// command; each new line is a child of the line it came from and keeps its
/// origin and flags.
pub fn split_batch(batch: &mut WireBatch, separator: char) -> RecordResult<()> {
    if !batch.iter().any(|line| line.is_io() && line.text().contains(separator)) {
        return Ok(());
    }

    let context = batch.context().clone();
    let mut lines = Vec::with_capacity(batch.len());
    for mut line in batch.take_lines()? {
        if !line.is_io() || !line.text().contains(separator) {
            lines.push(line);
            continue;
        }
        let parts = split_on_separator(&line.text(), separator);
        if let [single] = parts.as_slice() {
            line.set_payload(single.as_str())?;
            lines.push(line);
            continue;
        }
        let derived = context.child_of(line.id());
        for part in parts {
            lines.push(split_part(&derived, &line, part));
        }
        line.add_update(
            UpdateEntry::new(UpdateFlag::Info, "split into commands")
                .with_extra("separator", separator.to_string()),
        );
        line.archive(context.registry());
    }
    batch.replace_lines(lines)
}

fn split_part(context: &RecordContext, from: &WireLine, part: String) -> WireLine {
    WireLine::io(context, part, from.origin())
        .with_line_endings(from.had_line_endings())
        .with_preamble(from.preamble())
        .with_prelogin(from.prelogin())
        .with_color(from.color())
        .with_command_echo(from.command_echo())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mudproxy_records::{Origin, RecordRegistry};
    use std::sync::Arc;

    #[test]
    fn splits_on_single_separator() {
        assert_eq!(split_on_separator("look|score", '|'), vec!["look", "score"]);
        assert_eq!(split_on_separator("n|e|s", '|'), vec!["n", "e", "s"]);
        assert_eq!(split_on_separator("look", '|'), vec!["look"]);
    }

    #[test]
    fn doubled_separator_is_literal() {
        assert_eq!(split_on_separator("say hi||there", '|'), vec!["say hi|there"]);
        assert_eq!(split_on_separator("a|||b", '|'), vec!["a|", "b"]);
        assert_eq!(split_on_separator("||", '|'), vec!["|"]);
    }

    #[test]
    fn empty_commands_are_kept() {
        assert_eq!(split_on_separator("look|", '|'), vec!["look", ""]);
        assert_eq!(split_on_separator("", '|'), vec![""]);
    }

    #[test]
    fn batch_lines_are_replaced_in_place() {
        let registry = Arc::new(RecordRegistry::default());
        let context = RecordContext::new(registry.clone(), "client-1");
        let mut batch = WireBatch::new(&context);
        batch.push_text("first", Origin::Client).unwrap();
        batch.push_text("look|score", Origin::Client).unwrap();
        batch.push_text("say a||b", Origin::Client).unwrap();
        let original = batch.iter().nth(1).map(|line| line.id()).unwrap();

        split_batch(&mut batch, '|').unwrap();

        let texts: Vec<String> = batch.iter().map(|line| line.text().into_owned()).collect();
        assert_eq!(texts, vec!["first", "look", "score", "say a|b"]);
        assert_eq!(registry.children(original).len(), 2);
        assert!(batch.iter().all(|line| line.origin() == Origin::Client));
    }

    #[test]
    fn commands_are_not_split() {
        let context = RecordContext::new(Arc::new(RecordRegistry::default()), "mud");
        let mut batch = WireBatch::new(&context);
        batch.push_payload(vec![255, 250, b'|', 255, 240], Origin::Mud).unwrap();
        split_batch(&mut batch, '|').unwrap();
        assert_eq!(batch.len(), 1);
    }
}

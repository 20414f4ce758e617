/// Split `text` into messages of at most `max_chars` characters.
///
/// Each cut happens at the last `". "` inside the window, else at the last
/// whitespace, else exactly at the limit. Chunks are trimmed and empty chunks
/// are never produced.
#[must_use]
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
	let max_chars = max_chars.max(1);
	let mut chunks = Vec::new();
	let mut rest = text.trim();

	while !rest.is_empty() {
		let Some((limit, _)) = rest.char_indices().nth(max_chars) else {
			chunks.push(rest.to_string());
			break;
		};

		let window = &rest[..limit];
		let cut = window
			.rfind(". ")
			.map(|i| i + 1)
			.or_else(|| window.char_indices().rev().find(|(_, c)| c.is_whitespace()).map(|(i, _)| i))
			.filter(|&i| i > 0)
			.unwrap_or(limit);

		let (head, tail) = rest.split_at(cut);
		let head = head.trim_end();
		if !head.is_empty() {
			chunks.push(head.to_string());
		}
		rest = tail.trim_start();
	}

	chunks
}

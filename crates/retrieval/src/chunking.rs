/// Packs paragraphs into chunks of at most `max_chunk_chars` bytes. A single
/// paragraph longer than the limit is split at whitespace.
pub fn chunk_document(body: &str, max_chunk_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in body.split("\n\n") {
        let trimmed = paragraph.trim();
        if trimmed.is_empty() {
            continue;
        }

        for piece in split_oversized(trimmed, max_chunk_chars) {
            if current.len() + piece.len() + 2 > max_chunk_chars && !current.is_empty() {
                chunks.push(current.trim().to_string());
                current.clear();
            }

            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&piece);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

fn split_oversized(paragraph: &str, max_chars: usize) -> Vec<String> {
    if paragraph.len() <= max_chars {
        return vec![paragraph.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in paragraph.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

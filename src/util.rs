/// Read a response body into a bounded buffer.
///
/// Returns the bytes collected so far and whether the body overran the cap;
/// the remainder of an overrunning body is left unread.
pub async fn read_capped(
    mut response: reqwest::Response,
    cap: usize,
) -> Result<(String, bool), reqwest::Error> {
    let mut buffer: Vec<u8> = Vec::new();
    loop {
        match response.chunk().await? {
            Some(chunk) => {
                let room = cap.saturating_sub(buffer.len());
                if chunk.len() > room {
                    buffer.extend_from_slice(&chunk[..room]);
                    return Ok((String::from_utf8_lossy(&buffer).into_owned(), true));
                }
                buffer.extend_from_slice(&chunk);
            }
            None => return Ok((String::from_utf8_lossy(&buffer).into_owned(), false)),
        }
    }
}

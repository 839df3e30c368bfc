use super::*;
use pretty_assertions::assert_eq;
use tokio::io::BufReader;

#[tokio::test]
async fn writes_then_reads_messages_in_order() {
    let mut buffer = Vec::new();
    write_message(&mut buffer, &Message::Ready).await.unwrap();
    write_message(
        &mut buffer,
        &Message::Error {
            message: "boom".to_string(),
        },
    )
    .await
    .unwrap();

    let mut reader = BufReader::new(buffer.as_slice());
    assert!(matches!(
        read_message(&mut reader).await.unwrap(),
        Some(Message::Ready)
    ));
    match read_message(&mut reader).await.unwrap() {
        Some(Message::Error { message }) => assert_eq!(message, "boom"),
        other => panic!("unexpected message: {other:?}"),
    }
    assert!(read_message(&mut reader).await.unwrap().is_none());
}

#[tokio::test]
async fn skips_blank_lines() {
    let text = "\n\n{\"type\":\"SHUTDOWN\"}\n";
    let mut reader = BufReader::new(text.as_bytes());
    assert!(matches!(
        read_message(&mut reader).await.unwrap(),
        Some(Message::Shutdown)
    ));
}

#[tokio::test]
async fn reports_undecodable_lines() {
    let text = "{\"type\":\"NOT_A_VARIANT\"}\n";
    let mut reader = BufReader::new(text.as_bytes());
    let err = read_message(&mut reader).await.unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidMessage { .. }));
}

#[tokio::test]
async fn eof_is_clean() {
    let mut reader = BufReader::new(&b""[..]);
    assert!(read_message(&mut reader).await.unwrap().is_none());
}

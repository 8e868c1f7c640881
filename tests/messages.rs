use pregelflow::message::Message;

#[test]
fn convenience_constructors_set_expected_roles() {
    let user_msg = Message::user("Hello");
    assert_eq!(user_msg.role, Message::USER);
    assert_eq!(user_msg.content, "Hello");

    let assistant_msg = Message::assistant("Hi there!");
    assert_eq!(assistant_msg.role, Message::ASSISTANT);

    let system_msg = Message::system("You are helpful");
    assert_eq!(system_msg.role, Message::SYSTEM);

    let custom_msg = Message::new("function", "Result: 42");
    assert_eq!(custom_msg.role, "function");
    assert_eq!(custom_msg.content, "Result: 42");
}

#[test]
fn role_checking_is_exact() {
    let user_msg = Message::user("Hello");
    assert!(user_msg.has_role(Message::USER));
    assert!(!user_msg.has_role(Message::ASSISTANT));
}

#[test]
fn serialization_round_trips() {
    let original = Message::user("Test message");
    let json = serde_json::to_string(&original).expect("serialize");
    let deserialized: Message = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(original, deserialized);
}

use validator::ValidationError;

const MAX_ID_LENGTH: usize = 128;

/// 验证Worker ID格式
pub fn validate_worker_id(worker_id: &str) -> Result<(), ValidationError> {
    if worker_id.trim().is_empty() {
        return Err(ValidationError::new("Worker ID不能为空"));
    }

    if worker_id.len() > MAX_ID_LENGTH {
        return Err(ValidationError::new("Worker ID长度不能超过128个字符"));
    }

    if !worker_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':')
    {
        return Err(ValidationError::new(
            "Worker ID只能包含字母、数字、下划线、点、冒号和连字符",
        ));
    }

    Ok(())
}

/// 验证候选Worker列表：逐个校验，重复项交给派发时去重
pub fn validate_worker_ids(worker_ids: &[String]) -> Result<(), ValidationError> {
    if worker_ids.is_empty() {
        return Err(ValidationError::new("至少需要一个候选Worker"));
    }

    for worker_id in worker_ids {
        validate_worker_id(worker_id)?;
    }

    Ok(())
}

/// 验证联系电话：允许数字、空格、括号、连字符和开头的 `+`
pub fn validate_contact_number(contact_number: &str) -> Result<(), ValidationError> {
    let trimmed = contact_number.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("联系电话不能为空"));
    }

    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '-' || c == '(' || c == ')')
    {
        return Err(ValidationError::new("联系电话包含非法字符"));
    }

    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    if !(5..=20).contains(&digits) {
        return Err(ValidationError::new("联系电话位数应在5到20之间"));
    }

    Ok(())
}

/// 处理一条持久化事件
#[derive(Debug, Clone)]
pub struct ProcessPersistenceEventCommand {
    pub payload: Vec<u8>,
    /// 事件来源（分区/偏移量），仅用于日志
    pub source: String,
}

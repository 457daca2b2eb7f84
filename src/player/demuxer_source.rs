use crate::core::{CodedPacket, Result, StreamInfo};

/// 数据包来源抽象接口
///
/// FFmpeg 解封装器实现这个接口，测试中用合成数据源替代
pub trait PacketSource: Send {
    /// 数据包载荷类型
    type Packet;

    /// 读取下一个数据包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包
    /// - Ok(None): 到达流末尾
    /// - Err(e): 读取错误（管线按流结束处理）
    fn read_packet(&mut self) -> Result<Option<CodedPacket<Self::Packet>>>;

    /// 获取流信息
    fn stream_info(&self) -> &StreamInfo;

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}
